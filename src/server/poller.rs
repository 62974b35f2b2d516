//! Interface to the readiness poller that owns socket registrations.

use std::io;

use mio::event::Source;
use mio::{Registry, Token};

/// The readiness a connection waits for next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    Read,
    Write,
}

impl From<Interest> for mio::Interest {
    fn from(interest: Interest) -> Self {
        match interest {
            Interest::Read => mio::Interest::READABLE,
            Interest::Write => mio::Interest::WRITABLE,
        }
    }
}

/// Requests interest changes for a registered socket.
///
/// Registrations are one-shot from the connection's point of view: after
/// every dispatch the connection asks for exactly one interest again, or
/// deregisters.
pub trait Poller<S> {
    fn rearm(&self, stream: &mut S, token: Token, interest: Interest) -> io::Result<()>;
    fn deregister(&self, stream: &mut S) -> io::Result<()>;
}

impl<S: Source> Poller<S> for Registry {
    fn rearm(&self, stream: &mut S, token: Token, interest: Interest) -> io::Result<()> {
        self.reregister(stream, token, interest.into())
    }

    fn deregister(&self, stream: &mut S) -> io::Result<()> {
        Registry::deregister(self, stream)
    }
}
