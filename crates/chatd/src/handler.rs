//! Protocol handler: turns bytes from one connection into registry updates
//! and replies.
//!
//! The handler is stateless; everything it knows about a connection lives in
//! the [`SessionRegistry`]. It is invoked by a worker when a connection
//! becomes readable and runs until the socket has nothing more to give.
//!
//! # Per-connection state machine
//!
//! ```text
//!            name taken / empty
//!              ┌────────┐
//!              ▼        │
//! accept ──▶ Unnamed ───┴──(unique name)──▶ Named ──(/exit)──▶ closed
//!              │                              │
//!              └────────(EOF / error)─────────┴──────────────▶ closed
//! ```
//!
//! A logical message is whatever one read call returns; there is no line
//! reassembly, so clients should send one message per write.
//!
//! Departure notices are only sent for `/exit`. A connection that drops or
//! errors is removed silently.

use std::io;
use std::sync::Arc;

use chat_core::{ConnectionId, SessionState};
use chat_protocol::{decode_payload, Command, ServerText, Timestamp};
use tracing::{debug, info, warn};

use crate::config::DEFAULT_READ_BUFFER_SIZE;
use crate::registry::{Peer, RegistryError, SessionRegistry};

/// How a connection ended, when it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The client sent `/exit`.
    Exit,
    /// The read returned zero bytes.
    PeerClosed,
    /// The read failed.
    ReadError,
}

/// Result of servicing one readiness notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Drained everything available; the connection stays open.
    Open,
    /// The connection was closed and unregistered.
    Closed(CloseReason),
    /// No session exists for the handle, or it was removed mid-drain by
    /// someone else (server shutdown).
    Unknown,
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Closed,
    Gone,
}

/// Executes the chat protocol for one connection at a time.
///
/// Callers must not run two invocations for the same connection
/// concurrently; the reactor's dispatch gate guarantees this.
pub struct ProtocolHandler<P: Peer> {
    registry: Arc<SessionRegistry<P>>,
    read_buffer_size: usize,
    clock: fn() -> Timestamp,
}

impl<P: Peer> ProtocolHandler<P> {
    /// Creates a handler over `registry` using the wall clock.
    pub fn new(registry: Arc<SessionRegistry<P>>) -> Self {
        Self {
            registry,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            clock: Timestamp::now,
        }
    }

    /// Sets the size of each socket read (minimum 1).
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.max(1);
        self
    }

    /// Replaces the clock used for chat and whisper stamps.
    pub fn with_clock(mut self, clock: fn() -> Timestamp) -> Self {
        self.clock = clock;
        self
    }

    /// The registry this handler operates on.
    pub fn registry(&self) -> &Arc<SessionRegistry<P>> {
        &self.registry
    }

    /// Services a readable connection.
    ///
    /// Reads until the socket would block, handling the payload of each read
    /// as one message. Stops early once the connection is closed.
    pub fn handle_readable(&self, id: ConnectionId) -> ReadOutcome {
        let Some((peer, _)) = self.registry.lookup(id) else {
            debug!(conn = %id, "Readiness for unknown connection");
            return ReadOutcome::Unknown;
        };

        let mut buf = vec![0u8; self.read_buffer_size];
        loop {
            match peer.recv(&mut buf) {
                Ok(0) => {
                    self.registry.unregister(id);
                    info!(conn = %id, "Client disconnected");
                    return ReadOutcome::Closed(CloseReason::PeerClosed);
                }
                Ok(n) => {
                    let payload = buf.get(..n).unwrap_or_default();
                    match self.handle_message(id, payload) {
                        Flow::Continue => {}
                        Flow::Closed => return ReadOutcome::Closed(CloseReason::Exit),
                        Flow::Gone => {
                            debug!(conn = %id, "Session removed mid-drain");
                            return ReadOutcome::Unknown;
                        }
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return ReadOutcome::Open,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.registry.unregister(id);
                    warn!(conn = %id, error = %e, "Read failed, dropping client");
                    return ReadOutcome::Closed(CloseReason::ReadError);
                }
            }
        }
    }

    fn handle_message(&self, id: ConnectionId, payload: &[u8]) -> Flow {
        let text = decode_payload(payload);

        match self.registry.state(id) {
            Some(SessionState::Unnamed) => {
                self.claim_name(id, &text);
                Flow::Continue
            }
            Some(SessionState::Named(name)) => self.dispatch(id, &name, &text),
            // Closed underneath us (server shutdown).
            None => Flow::Gone,
        }
    }

    fn claim_name(&self, id: ConnectionId, requested: &str) {
        match self.registry.try_claim_name(id, requested) {
            Ok(()) => {
                info!(conn = %id, name = %requested, "Name claimed");
                let name = requested.to_string();
                self.reply(id, &ServerText::Welcome { name: name.clone() });
                let joined = ServerText::Joined { name }.to_wire();
                self.registry.broadcast(|other, _| other != id, &joined);
            }
            Err(RegistryError::NameTaken { .. } | RegistryError::EmptyName) => {
                debug!(conn = %id, "Name request refused");
                self.reply(id, &ServerText::NameInUse);
            }
            Err(e) => debug!(conn = %id, error = %e, "Name claim skipped"),
        }
    }

    fn dispatch(&self, id: ConnectionId, name: &str, text: &str) -> Flow {
        match Command::parse(text) {
            Command::Exit => {
                let left = ServerText::Left {
                    name: name.to_string(),
                }
                .to_wire();
                self.registry.broadcast(|other, _| other != id, &left);
                self.registry.unregister(id);
                info!(conn = %id, name = %name, "Client left");
                return Flow::Closed;
            }

            Command::List => {
                let names = self.registry.snapshot_names();
                self.reply(id, &ServerText::NameList { names });
            }

            Command::Whisper { to, text } => {
                let line = ServerText::Whisper {
                    at: (self.clock)(),
                    from: name.to_string(),
                    to: to.to_string(),
                    text: text.to_string(),
                }
                .to_wire();

                if self.registry.whisper(id, to, &line).is_none() {
                    self.reply(
                        id,
                        &ServerText::NotFound {
                            name: to.to_string(),
                        },
                    );
                }
            }

            Command::MalformedWhisper => {
                debug!(conn = %id, "Ignoring malformed whisper");
            }

            Command::Rename { name: new_name } => match self.registry.rename(id, new_name) {
                Ok(old) => {
                    info!(conn = %id, old = %old, new = %new_name, "Client renamed");
                    let notice = ServerText::Renamed {
                        old,
                        new: new_name.to_string(),
                    }
                    .to_wire();
                    self.registry.broadcast(|_, _| true, &notice);
                }
                Err(RegistryError::NameTaken { .. } | RegistryError::EmptyName) => {
                    self.reply(id, &ServerText::NameInUse);
                }
                Err(e) => debug!(conn = %id, error = %e, "Rename skipped"),
            },

            Command::Chat(body) => {
                debug!(conn = %id, "Broadcasting chat message");
                let line = ServerText::Chat {
                    from: name.to_string(),
                    at: (self.clock)(),
                    text: body.to_string(),
                }
                .to_wire();
                self.registry.broadcast(|_, _| true, &line);
            }
        }

        Flow::Continue
    }

    fn reply(&self, id: ConnectionId, text: &ServerText) {
        self.send_line(id, &text.to_wire());
    }

    /// Sends through the registry so writes to one socket never interleave.
    fn send_line(&self, id: ConnectionId, wire: &str) {
        if !self.registry.send_to(id, wire) {
            debug!(conn = %id, "Reply target already gone");
        }
    }
}
