//! Session registry behind a single lock.
//!
//! The registry is the single source of truth for who is connected and what
//! they are called. Every operation runs under one mutex covering the whole
//! map, and the raw map is never handed out, so the invariants below hold at
//! this entry point rather than by caller discipline:
//!
//! - every entry owns an open peer, and removing the entry closes the peer in
//!   the same critical section (no entry without a connection, no connection
//!   without an entry, no double close)
//! - no two sessions hold the same non-empty name (check and set happen
//!   under the same lock acquisition)
//! - a broadcast iterates a set that cannot change until it finishes
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐  register / unregister   ┌──────────────────────────┐
//! │ accept task      │─────────────────────────▶│ SessionRegistry          │
//! └──────────────────┘                          │  Mutex<HashMap<          │
//! ┌──────────────────┐  claim / rename / send   │    ConnectionId,         │
//! │ protocol handler │─────────────────────────▶│    Session { peer, .. }>>│
//! └──────────────────┘                          └──────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()` or `.expect()` in production code
//! - A poisoned lock is recovered rather than propagated; the map is never
//!   left half-updated because no operation can panic mid-mutation

#[cfg(test)]
mod memory;
mod peer;

#[cfg(test)]
pub use memory::MemoryPeer;
pub use peer::Peer;

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chat_core::{validate_name, ConnectionId, SessionState};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors from registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Name already in use: {name}")]
    NameTaken { name: String },

    #[error("Display name must not be empty")]
    EmptyName,

    #[error("Unknown connection: {0}")]
    UnknownConnection(ConnectionId),

    #[error("Connection already registered: {0}")]
    AlreadyRegistered(ConnectionId),

    #[error("Connection {0} has already claimed a name")]
    AlreadyNamed(ConnectionId),

    #[error("Connection {0} has not claimed a name yet")]
    NotNamed(ConnectionId),

    #[error("Failed to arm connection: {0}")]
    Arm(#[source] io::Error),
}

struct Session<P> {
    peer: Arc<P>,
    state: SessionState,
}

type SessionMap<P> = HashMap<ConnectionId, Session<P>>;

/// Shared map from connection handle to session.
pub struct SessionRegistry<P: Peer> {
    sessions: Mutex<SessionMap<P>>,
}

impl<P: Peer> Default for SessionRegistry<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Peer> SessionRegistry<P> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionMap<P>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts an unnamed session for `id`.
    pub fn register(&self, id: ConnectionId, peer: Arc<P>) -> Result<(), RegistryError> {
        self.register_with(id, peer, |_| Ok(()))
    }

    /// Inserts an unnamed session for `id`, running `arm` first under the
    /// registry lock.
    ///
    /// `arm` is where the caller makes the peer live (readiness registration,
    /// greeting). Holding the lock while it runs means no other operation can
    /// observe the connection before it is both armed and present. If `arm`
    /// fails, the peer is closed and nothing is inserted.
    pub fn register_with<F>(&self, id: ConnectionId, peer: Arc<P>, arm: F) -> Result<(), RegistryError>
    where
        F: FnOnce(&P) -> io::Result<()>,
    {
        let mut sessions = self.lock();

        if sessions.contains_key(&id) {
            peer.close();
            return Err(RegistryError::AlreadyRegistered(id));
        }

        if let Err(e) = arm(&peer) {
            peer.close();
            return Err(RegistryError::Arm(e));
        }

        sessions.insert(
            id,
            Session {
                peer,
                state: SessionState::Unnamed,
            },
        );
        debug!(conn = %id, sessions = sessions.len(), "Session registered");
        Ok(())
    }

    /// Removes the session and closes its peer in one step.
    ///
    /// Returns the state the session had, or `None` if it was already gone
    /// (in which case nothing is closed).
    pub fn unregister(&self, id: ConnectionId) -> Option<SessionState> {
        let mut sessions = self.lock();
        let session = sessions.remove(&id)?;
        session.peer.close();
        debug!(conn = %id, sessions = sessions.len(), "Session unregistered");
        Some(session.state)
    }

    /// The peer and current state for `id`.
    pub fn lookup(&self, id: ConnectionId) -> Option<(Arc<P>, SessionState)> {
        let sessions = self.lock();
        sessions
            .get(&id)
            .map(|session| (Arc::clone(&session.peer), session.state.clone()))
    }

    /// Current state for `id`.
    pub fn state(&self, id: ConnectionId) -> Option<SessionState> {
        self.lock().get(&id).map(|session| session.state.clone())
    }

    /// Claims `name` for an unnamed session.
    ///
    /// Fails if the name is empty or held by any live session.
    pub fn try_claim_name(&self, id: ConnectionId, name: &str) -> Result<(), RegistryError> {
        let mut sessions = self.lock();
        check_available(&sessions, name)?;

        let session = sessions
            .get_mut(&id)
            .ok_or(RegistryError::UnknownConnection(id))?;
        if session.state.is_named() {
            return Err(RegistryError::AlreadyNamed(id));
        }

        session.state = SessionState::Named(name.to_string());
        Ok(())
    }

    /// Renames a named session, returning its previous name.
    ///
    /// Same availability rule as [`try_claim_name`](Self::try_claim_name);
    /// a session's own current name counts as taken.
    pub fn rename(&self, id: ConnectionId, new_name: &str) -> Result<String, RegistryError> {
        let mut sessions = self.lock();
        check_available(&sessions, new_name)?;

        let session = sessions
            .get_mut(&id)
            .ok_or(RegistryError::UnknownConnection(id))?;
        let SessionState::Named(old) = &session.state else {
            return Err(RegistryError::NotNamed(id));
        };

        let old = old.clone();
        session.state = SessionState::Named(new_name.to_string());
        Ok(old)
    }

    /// Every claimed name, in map iteration order.
    pub fn snapshot_names(&self) -> Vec<String> {
        self.lock()
            .values()
            .filter_map(|session| session.state.name().map(str::to_string))
            .collect()
    }

    /// The connection holding `name`, if any.
    pub fn find_by_name(&self, name: &str) -> Option<ConnectionId> {
        find_named(&self.lock(), name)
    }

    /// Sends `text` to one connection. Returns false if it is not registered.
    pub fn send_to(&self, id: ConnectionId, text: &str) -> bool {
        let sessions = self.lock();
        match sessions.get(&id) {
            Some(session) => {
                deliver(id, session.peer.as_ref(), text);
                true
            }
            None => false,
        }
    }

    /// Delivers a whisper: first a copy to `sender`, then `text` to whoever
    /// holds `name`, all under one lock acquisition. Whispering to oneself
    /// therefore delivers two copies. Returns the recipient, or `None` (and
    /// sends nothing) if nobody holds the name.
    pub fn whisper(&self, sender: ConnectionId, name: &str, text: &str) -> Option<ConnectionId> {
        let sessions = self.lock();
        let recipient = find_named(&sessions, name)?;
        if let Some(session) = sessions.get(&sender) {
            deliver(sender, session.peer.as_ref(), text);
        }
        let session = sessions.get(&recipient)?;
        deliver(recipient, session.peer.as_ref(), text);
        Some(recipient)
    }

    /// Sends `text` to every session accepted by `filter`, holding the lock
    /// for the whole pass. Returns how many sessions were addressed.
    pub fn broadcast<F>(&self, filter: F, text: &str) -> usize
    where
        F: Fn(ConnectionId, &SessionState) -> bool,
    {
        let sessions = self.lock();
        let mut addressed = 0;
        for (&id, session) in sessions.iter() {
            if filter(id, &session.state) {
                deliver(id, session.peer.as_ref(), text);
                addressed += 1;
            }
        }
        addressed
    }

    /// Removes and closes every session. Returns how many were closed.
    pub fn close_all(&self) -> usize {
        let mut sessions = self.lock();
        let count = sessions.len();
        for (_, session) in sessions.drain() {
            session.peer.close();
        }
        count
    }

    /// Whether `id` has a session.
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.lock().contains_key(&id)
    }

    /// Number of sessions.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no session is registered.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

fn check_available<P>(sessions: &SessionMap<P>, name: &str) -> Result<(), RegistryError> {
    if validate_name(name).is_err() {
        return Err(RegistryError::EmptyName);
    }
    if find_named(sessions, name).is_some() {
        return Err(RegistryError::NameTaken {
            name: name.to_string(),
        });
    }
    Ok(())
}

fn find_named<P>(sessions: &SessionMap<P>, name: &str) -> Option<ConnectionId> {
    if name.is_empty() {
        return None;
    }
    sessions
        .iter()
        .find(|(_, session)| session.state.name() == Some(name))
        .map(|(&id, _)| id)
}

fn deliver<P: Peer>(id: ConnectionId, peer: &P, text: &str) {
    if let Err(e) = peer.send(text) {
        warn!(conn = %id, error = %e, "Failed to deliver message");
    }
}
