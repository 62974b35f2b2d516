//! Per-connection driver: non-blocking reads, request parsing, response
//! assembly and scatter/gather writes.

use std::io::{self, Read, Write};
use std::sync::Arc;

use log::{debug, trace, warn};
use mio::Token;

use crate::parser::{HttpRequest, ParseState, ParseStatus, ReadBuffer, RequestParser};
use crate::server::config::TriggerMode;
use crate::server::error::Error;
use crate::server::handler::RequestHandler;
use crate::server::poller::{Interest, Poller};
use crate::server::resolver::FileResource;
use crate::server::response::{
    build_error_response, build_file_response, StatusCode, Transmission, WriteBuffer,
};

/// What the dispatcher should do with a connection after a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The connection re-armed its interest and stays registered.
    KeepOpen,
    /// The connection deregistered itself and can be dropped.
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Reading,
    Writing,
}

/// One accepted socket and everything needed to answer requests on it.
///
/// A connection is driven by one thread at a time. Each call to
/// [`run`](Self::run) ends with exactly one re-arm request to the poller or
/// with the connection deregistered.
pub struct Connection<S, P> {
    stream: S,
    token: Token,
    poller: Arc<P>,
    handler: Arc<RequestHandler>,
    trigger_mode: TriggerMode,
    read_buf: ReadBuffer,
    parser: RequestParser,
    write_buf: WriteBuffer,
    file: Option<FileResource>,
    tx: Transmission,
    keep_alive: bool,
    phase: Phase,
    closed: bool,
}

impl<S, P> Connection<S, P>
where
    S: Read + Write,
    P: Poller<S>,
{
    pub fn new(
        stream: S,
        token: Token,
        poller: Arc<P>,
        handler: Arc<RequestHandler>,
        trigger_mode: TriggerMode,
    ) -> Self {
        Self {
            stream,
            token,
            poller,
            handler,
            trigger_mode,
            read_buf: ReadBuffer::new(),
            parser: RequestParser::new(),
            write_buf: WriteBuffer::new(),
            file: None,
            tx: Transmission::default(),
            keep_alive: false,
            phase: Phase::Reading,
            closed: false,
        }
    }

    pub fn token(&self) -> Token {
        self.token
    }

    pub fn stream(&self) -> &S {
        &self.stream
    }

    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    pub fn parse_state(&self) -> ParseState {
        self.parser.state()
    }

    pub fn request(&self) -> &HttpRequest {
        self.parser.request()
    }

    pub fn read_buffer(&self) -> &ReadBuffer {
        &self.read_buf
    }

    pub fn bytes_to_send(&self) -> usize {
        self.tx.bytes_to_send()
    }

    pub fn bytes_have_send(&self) -> usize {
        self.tx.bytes_have_send()
    }

    /// Whether a file mapping is currently held.
    pub fn has_mapping(&self) -> bool {
        self.file.is_some()
    }

    pub fn is_writing(&self) -> bool {
        self.phase == Phase::Writing
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Advances the connection after a readiness notification.
    ///
    /// Reads and parses while a request is being received, otherwise
    /// continues sending the pending response.
    pub fn run(&mut self) -> Disposition {
        if self.closed {
            return Disposition::Close;
        }
        match self.phase {
            Phase::Reading => {
                if !self.read_once() {
                    self.close();
                    return Disposition::Close;
                }
                self.process()
            }
            Phase::Writing => self.write(),
        }
    }

    /// Pulls bytes from the socket into the read buffer.
    ///
    /// Returns false when the peer closed, the socket failed, or the request
    /// outgrew the buffer.
    pub fn read_once(&mut self) -> bool {
        if self.read_buf.is_full() {
            warn!("read buffer full on {:?}", self.token);
            return false;
        }

        match self.trigger_mode {
            TriggerMode::Level => match self.stream.read(self.read_buf.spare_mut()) {
                Ok(0) => false,
                Ok(n) => {
                    self.read_buf.advance(n);
                    true
                }
                Err(e) => {
                    debug!("read on {:?} failed: {e}", self.token);
                    false
                }
            },
            TriggerMode::Edge => loop {
                if self.read_buf.is_full() {
                    warn!("request too large on {:?}", self.token);
                    return false;
                }
                match self.stream.read(self.read_buf.spare_mut()) {
                    Ok(0) => return false,
                    Ok(n) => self.read_buf.advance(n),
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => return true,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        debug!("read on {:?} failed: {e}", self.token);
                        return false;
                    }
                }
            },
        }
    }

    /// Parses what has been read. Once the request is complete the response
    /// is assembled and sending starts.
    pub fn process(&mut self) -> Disposition {
        let (result, keep_alive) = match self.parser.parse(&mut self.read_buf) {
            Ok(ParseStatus::Incomplete) => return self.rearm(Interest::Read),
            Ok(ParseStatus::Complete) => {
                let request = self.parser.request_mut();
                debug!("{} {} on {:?}", request.method, request.path, self.token);
                let keep_alive = request.keep_alive;
                (self.handler.handle(request), keep_alive)
            }
            Err(e) => {
                warn!("bad request on {:?}: {e}", self.token);
                (Err(Error::from(e)), false)
            }
        };

        if let Err(e) = self.prepare_response(result, keep_alive) {
            warn!("cannot build response on {:?}: {e}", self.token);
            self.close();
            return Disposition::Close;
        }
        self.phase = Phase::Writing;
        self.write()
    }

    fn prepare_response(
        &mut self,
        result: Result<FileResource, Error>,
        keep_alive: bool,
    ) -> Result<(), Error> {
        self.write_buf.clear();
        self.file = None;

        let built = match result {
            Ok(file) => {
                self.keep_alive = keep_alive;
                let tx = build_file_response(&mut self.write_buf, &file.path, file.map.len(), keep_alive);
                if !file.map.is_empty() {
                    self.file = Some(file);
                }
                tx
            }
            Err(e) => {
                let status = e.status_code();
                debug!("answering {:?} with {}: {e}", self.token, status.as_u16());
                self.keep_alive = keep_alive
                    && matches!(status, StatusCode::NotFound | StatusCode::Forbidden);
                build_error_response(&mut self.write_buf, status, self.keep_alive)
            }
        };

        self.tx = match built {
            Ok(tx) => tx,
            Err(e) => {
                warn!("response for {:?} failed: {e}", self.token);
                self.unmap();
                self.write_buf.clear();
                self.keep_alive = false;
                build_error_response(&mut self.write_buf, StatusCode::InternalServerError, false)?
            }
        };
        Ok(())
    }

    /// Sends the pending response with scatter/gather writes.
    ///
    /// On would-block the remaining ranges stay queued and write readiness
    /// is requested. When everything is out the mapping is released and the
    /// connection either resets for the next request or closes.
    pub fn write(&mut self) -> Disposition {
        if self.tx.is_done() {
            self.reset();
            return self.rearm(Interest::Read);
        }

        loop {
            let file = self.file.as_ref().map(|f| f.map.as_slice()).unwrap_or(&[]);
            let (slices, count) = self.tx.io_slices(self.write_buf.as_slice(), file);
            match self.stream.write_vectored(&slices[..count]) {
                Ok(0) => {
                    warn!("write on {:?} returned zero", self.token);
                    self.close();
                    return Disposition::Close;
                }
                Ok(n) => {
                    self.tx.advance(n);
                    trace!(
                        "wrote {n} bytes on {:?}, {} left",
                        self.token,
                        self.tx.bytes_to_send()
                    );
                    if self.tx.is_done() {
                        self.unmap();
                        if self.keep_alive {
                            self.reset();
                            return self.rearm(Interest::Read);
                        }
                        self.close();
                        return Disposition::Close;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return self.rearm(Interest::Write);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!("write on {:?} failed: {e}", self.token);
                    self.close();
                    return Disposition::Close;
                }
            }
        }
    }

    /// Releases the mapping and deregisters the socket. Safe to call twice.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.unmap();
        if let Err(e) = self.poller.deregister(&mut self.stream) {
            debug!("deregister {:?} failed: {e}", self.token);
        }
    }

    fn rearm(&mut self, interest: Interest) -> Disposition {
        match self.poller.rearm(&mut self.stream, self.token, interest) {
            Ok(()) => Disposition::KeepOpen,
            Err(e) => {
                warn!("re-arm {:?} for {interest:?} failed: {e}", self.token);
                self.close();
                Disposition::Close
            }
        }
    }

    fn unmap(&mut self) {
        self.file = None;
    }

    /// Prepares for the next request on the same socket.
    fn reset(&mut self) {
        self.unmap();
        self.parser.reset();
        self.read_buf.clear();
        self.write_buf.clear();
        self.tx.clear();
        self.keep_alive = false;
        self.phase = Phase::Reading;
    }
}
