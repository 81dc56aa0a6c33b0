//! TCP chat server: the readiness reactor.
//!
//! The server:
//! - Owns the listening socket and the `mio` poll (epoll on Linux)
//! - Turns listener readiness into accept-drain tasks on the worker pool
//! - Turns client readiness into read tasks, at most one in flight per client
//! - Stops on request through a [`ShutdownHandle`]
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐  readiness   ┌─────────────────┐
//! │   ChatServer    │─────────────▶│   WorkerPool    │
//! │  (poll thread)  │   submit     │  (N threads)    │
//! └───────┬─────────┘              └───────┬─────────┘
//!         │ DispatchGate                   │ accept / handle_readable
//!         ▼                                ▼
//! ┌─────────────────┐              ┌─────────────────┐
//! │  one in-flight  │              │ ProtocolHandler │
//! │  task per conn  │              └───────┬─────────┘
//! └─────────────────┘                      │
//!                                          ▼
//!                                  ┌─────────────────┐
//!                                  │ SessionRegistry │
//!                                  │   (TcpPeer)     │
//!                                  └─────────────────┘
//! ```
//!
//! # Tokens
//!
//! `Token(0)` is the listener and `Token(1)` the shutdown waker; every client
//! is registered under its [`ConnectionId`], allocated from 2 upwards and
//! never reused.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()` outside tests
//! - Per-connection failures are logged and only affect that connection
//! - Only setup failures and a broken poll surface as [`ServerError`]

mod connection;
mod dispatch;

pub use connection::TcpPeer;
pub use dispatch::{DispatchGate, Release};

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chat_core::{ConnectionId, ConnectionIdAllocator};
use chat_protocol::ServerText;
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Registry, Token, Waker};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{ConfigError, ServerConfig};
use crate::handler::{ProtocolHandler, ReadOutcome};
use crate::pool::{PoolError, WorkerPool};
use crate::registry::{Peer, SessionRegistry};

/// Token of the listening socket.
pub const LISTENER: Token = Token(0);

/// Token of the shutdown waker.
pub const WAKER: Token = Token(1);

/// First connection id handed out; everything below is reserved.
pub const FIRST_CONNECTION_ID: usize = 2;

/// Consecutive accept failures tolerated within one drain.
///
/// Hitting the limit ends the drain with connections possibly still queued on
/// the listener. They wait until the next listener edge, which a new incoming
/// connection raises.
const MAX_ACCEPT_FAILURES: usize = 32;

/// Errors that stop the server from starting or running.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("Poll error: {0}")]
    Poll(#[source] io::Error),

    #[error("Failed to register with poll: {0}")]
    Register(#[source] io::Error),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Requests a running [`ChatServer`] to stop. Cheap to clone and safe to use
/// from any thread, including signal-handling ones.
#[derive(Clone)]
pub struct ShutdownHandle {
    requested: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl ShutdownHandle {
    /// Asks the reactor to stop. Repeated calls are no-ops.
    pub fn shutdown(&self) {
        if self.requested.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.waker.wake() {
            warn!(error = %e, "Failed to wake reactor for shutdown");
        }
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for ShutdownHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownHandle")
            .field("requested", &self.is_requested())
            .finish()
    }
}

/// State reachable from worker tasks.
struct Shared {
    listener: TcpListener,
    poll_registry: Arc<Registry>,
    registry: Arc<SessionRegistry<TcpPeer>>,
    handler: ProtocolHandler<TcpPeer>,
    gate: DispatchGate,
    ids: ConnectionIdAllocator,
}

impl Shared {
    /// Accepts until the listener has nothing pending.
    fn accept_pending(&self) {
        let mut failures = 0;
        loop {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    failures = 0;
                    self.admit(stream, addr);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(error = %e, "Accept failed");
                    failures += 1;
                    if failures >= MAX_ACCEPT_FAILURES {
                        warn!(failures, "Abandoning accept drain after repeated failures");
                        return;
                    }
                }
            }
        }
    }

    /// Arms a freshly accepted socket and inserts its unnamed session.
    fn admit(&self, stream: TcpStream, addr: SocketAddr) {
        let id = self.ids.allocate();
        let peer = Arc::new(TcpPeer::new(stream, addr, Arc::clone(&self.poll_registry)));

        let registered = self.registry.register_with(id, peer, |peer| {
            peer.arm(Token(id.as_usize()))?;
            if let Err(e) = peer.send(&ServerText::Prompt.to_wire()) {
                debug!(conn = %id, error = %e, "Prompt not delivered");
            }
            Ok(())
        });

        match registered {
            Ok(()) => info!(conn = %id, peer = %addr, "Client connected"),
            Err(e) => warn!(conn = %id, peer = %addr, error = %e, "Failed to register connection"),
        }
    }

    /// Runs the handler for `id` until no readiness is pending.
    fn service(&self, id: ConnectionId) {
        self.gate
            .run_owned(id, || self.handler.handle_readable(id) == ReadOutcome::Open);
    }
}

/// Multi-client chat server on an edge-triggered reactor.
pub struct ChatServer {
    poll: Poll,
    events_capacity: usize,
    local_addr: SocketAddr,
    shared: Arc<Shared>,
    pool: WorkerPool,
    shutdown: ShutdownHandle,
}

impl ChatServer {
    /// Binds the listener and starts the worker pool.
    ///
    /// Nothing is accepted until [`run`](Self::run) is called.
    pub fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        config.validate()?;

        let addr = config.socket_addr();
        let mut listener =
            TcpListener::bind(addr).map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;

        let poll = Poll::new().map_err(ServerError::Poll)?;
        poll.registry()
            .register(&mut listener, LISTENER, Interest::READABLE)
            .map_err(ServerError::Register)?;
        let waker = Waker::new(poll.registry(), WAKER).map_err(ServerError::Register)?;
        let poll_registry = poll.registry().try_clone().map_err(ServerError::Poll)?;

        let pool = WorkerPool::new(config.pool_size, "chatd-worker")?;

        let registry = Arc::new(SessionRegistry::new());
        let handler = ProtocolHandler::new(Arc::clone(&registry))
            .with_read_buffer_size(config.read_buffer_size);

        let shared = Arc::new(Shared {
            listener,
            poll_registry: Arc::new(poll_registry),
            registry,
            handler,
            gate: DispatchGate::new(),
            ids: ConnectionIdAllocator::starting_at(FIRST_CONNECTION_ID),
        });

        debug!(addr = %local_addr, workers = config.pool_size, "Chat server bound");

        Ok(Self {
            poll,
            events_capacity: config.events_capacity,
            local_addr,
            shared,
            pool,
            shutdown: ShutdownHandle {
                requested: Arc::new(AtomicBool::new(false)),
                waker: Arc::new(waker),
            },
        })
    }

    /// The address actually bound (resolves port `0`).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The live session registry.
    pub fn registry(&self) -> &Arc<SessionRegistry<TcpPeer>> {
        &self.shared.registry
    }

    /// A handle that stops [`run`](Self::run) from another thread.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Runs the reactor until shutdown is requested.
    ///
    /// On the way out the worker pool is drained and joined, then every
    /// remaining session is closed.
    pub fn run(mut self) -> Result<(), ServerError> {
        let mut events = Events::with_capacity(self.events_capacity);
        info!(
            addr = %self.local_addr,
            workers = self.pool.size(),
            "Chat server listening"
        );

        let result = loop {
            if self.shutdown.is_requested() {
                info!("Server shutdown requested");
                break Ok(());
            }

            if let Err(e) = self.poll.poll(&mut events, None) {
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                break Err(ServerError::Poll(e));
            }

            for event in events.iter() {
                match event.token() {
                    WAKER => {}
                    LISTENER => self.dispatch_accept(),
                    Token(raw) => self.dispatch_read(ConnectionId::new(raw)),
                }
            }
        };

        self.teardown();
        result
    }

    fn dispatch_accept(&self) {
        let shared = Arc::clone(&self.shared);
        if let Err(e) = self.pool.submit(move || shared.accept_pending()) {
            warn!(error = %e, "Failed to schedule accept");
        }
    }

    fn dispatch_read(&self, id: ConnectionId) {
        if !self.shared.gate.try_acquire(id) {
            debug!(conn = %id, "Readiness folded into in-flight task");
            return;
        }

        let shared = Arc::clone(&self.shared);
        if let Err(e) = self.pool.submit(move || shared.service(id)) {
            self.shared.gate.abandon(id);
            warn!(conn = %id, error = %e, "Failed to schedule read");
        }
    }

    fn teardown(&self) {
        self.pool.shutdown();
        let closed = self.shared.registry.close_all();
        info!(closed, "Chat server stopped");
    }
}

impl std::fmt::Debug for ChatServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatServer")
            .field("local_addr", &self.local_addr)
            .field("workers", &self.pool.size())
            .field("sessions", &self.shared.registry.len())
            .finish()
    }
}
