//! HTTP server implementation: one mio event loop per worker thread.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Poll, Registry, Token};
use socket2::{Domain, Protocol, Socket, Type};

use crate::server::config::ServerConfig;
use crate::server::connection::{Connection, Disposition};
use crate::server::credentials::{CredentialStore, MemoryCredentialStore};
use crate::server::error::Error;
use crate::server::handler::RequestHandler;
use crate::server::resolver::Resolver;
use crate::server::slab::Slab;
use crate::server::timer::IdleTimer;

const LISTENER: Token = Token(0);
const POLL_TIMEOUT: Duration = Duration::from_secs(1);
const LISTEN_BACKLOG: i32 = 4096;

/// An HTTP server.
pub struct HttpServer {
    /// The server configuration.
    pub config: ServerConfig,
    handler: Arc<RequestHandler>,
    active: Arc<AtomicUsize>,
}

impl HttpServer {
    /// Create a server, seeding the user store from `users_file` if set.
    pub fn new(config: ServerConfig) -> Result<Self, Error> {
        let store: Arc<dyn CredentialStore> = match &config.users_file {
            Some(path) => Arc::new(MemoryCredentialStore::from_json_file(path)?),
            None => Arc::new(MemoryCredentialStore::new()),
        };
        Ok(Self::with_store(config, store))
    }

    /// Create a server backed by the given credential store.
    pub fn with_store(config: ServerConfig, store: Arc<dyn CredentialStore>) -> Self {
        let handler = RequestHandler::new(Resolver::new(&config.doc_root), store);
        Self {
            config,
            handler: Arc::new(handler),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn handler(&self) -> &Arc<RequestHandler> {
        &self.handler
    }

    /// Number of open connections across all workers.
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Start the workers and block until they exit.
    pub fn start(&self) -> Result<(), Error> {
        let workers = self.config.workers.max(1);
        info!(
            "Server listening on http://{} serving {} ({workers} workers, {:?})",
            self.config.addr,
            self.config.doc_root.display(),
            self.config.trigger_mode
        );

        let handles = (0..workers)
            .map(|id| {
                let worker = Worker {
                    id,
                    config: self.config.clone(),
                    capacity: (self.config.max_connections / workers).max(1),
                    handler: Arc::clone(&self.handler),
                    active: Arc::clone(&self.active),
                };
                thread::Builder::new()
                    .name(format!("worker-{id}"))
                    .spawn(move || worker.run())
            })
            .collect::<io::Result<Vec<_>>>()?;

        for handle in handles {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("worker stopped: {e}"),
                Err(_) => error!("worker panicked"),
            }
        }
        Ok(())
    }
}

struct Slot {
    conn: Connection<TcpStream, Registry>,
    generation: u64,
    deadline: Instant,
}

struct Worker {
    id: usize,
    config: ServerConfig,
    capacity: usize,
    handler: Arc<RequestHandler>,
    active: Arc<AtomicUsize>,
}

impl Worker {
    fn run(self) -> Result<(), Error> {
        let mut listener = bind_listener(self.config.addr)?;
        let mut poll = Poll::new()?;
        let registry = Arc::new(poll.registry().try_clone()?);
        poll.registry()
            .register(&mut listener, LISTENER, mio::Interest::READABLE)?;

        let timeout = Duration::from_secs(self.config.idle_timeout_secs);
        let mut events = Events::with_capacity(1024);
        let mut slab: Slab<Slot> = Slab::new(self.capacity);
        let mut timer = IdleTimer::new(timeout);
        let mut expired = Vec::new();
        let mut generation = 0u64;

        debug!("worker {} ready", self.id);
        loop {
            match poll.poll(&mut events, Some(POLL_TIMEOUT)) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }

            for event in events.iter() {
                match event.token() {
                    LISTENER => loop {
                        match listener.accept() {
                            Ok((stream, peer)) => {
                                generation += 1;
                                self.admit(stream, peer, &registry, &mut slab, &mut timer, generation, timeout);
                            }
                            Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                            Err(e) => {
                                warn!("accept error: {e}");
                                break;
                            }
                        }
                    },
                    token => self.dispatch(token, &mut slab, timeout),
                }
            }

            let now = Instant::now();
            timer.expire(
                now,
                |token, stamp| {
                    slab.get(token)
                        .filter(|slot| slot.generation == stamp)
                        .map(|slot| slot.deadline)
                },
                &mut expired,
            );
            for token in expired.drain(..) {
                info!("idle timeout, closing {token:?}");
                self.release(token, &mut slab);
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn admit(
        &self,
        mut stream: TcpStream,
        peer: SocketAddr,
        registry: &Arc<Registry>,
        slab: &mut Slab<Slot>,
        timer: &mut IdleTimer,
        generation: u64,
        timeout: Duration,
    ) {
        if self.active.load(Ordering::Relaxed) >= self.config.max_connections {
            warn!("connection limit reached, rejecting {peer}");
            return;
        }
        let Some(token) = slab.vacant() else {
            warn!("worker {} is full, rejecting {peer}", self.id);
            return;
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!("set_nodelay for {peer} failed: {e}");
        }
        if let Err(e) = registry.register(&mut stream, token, mio::Interest::READABLE) {
            warn!("register failed for {peer}: {e}");
            return;
        }

        let conn = Connection::new(
            stream,
            token,
            Arc::clone(registry),
            Arc::clone(&self.handler),
            self.config.trigger_mode,
        );
        slab.insert(token, Slot { conn, generation, deadline: Instant::now() + timeout });
        timer.touch(token, generation);
        self.active.fetch_add(1, Ordering::Relaxed);
        debug!("accepted {peer} as {token:?}");
    }

    fn dispatch(&self, token: Token, slab: &mut Slab<Slot>, timeout: Duration) {
        let Some(slot) = slab.get_mut(token) else { return };
        // The wheel entry from admit() reschedules itself against this deadline
        slot.deadline = Instant::now() + timeout;

        if slot.conn.run() == Disposition::Close {
            self.release(token, slab);
        }
    }

    fn release(&self, token: Token, slab: &mut Slab<Slot>) {
        if let Some(mut slot) = slab.remove(token) {
            slot.conn.close();
            self.active.fetch_sub(1, Ordering::Relaxed);
            debug!("closed {token:?}, {} left on worker {}", slab.len(), self.id);
        }
    }
}

fn bind_listener(addr: SocketAddr) -> io::Result<TcpListener> {
    let sock = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    sock.set_reuse_address(true)?;
    sock.set_reuse_port(true)?;
    sock.set_nonblocking(true)?;
    sock.bind(&addr.into())?;
    sock.listen(LISTEN_BACKLOG)?;
    Ok(TcpListener::from_std(sock.into()))
}
