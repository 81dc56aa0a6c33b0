//! Per-connection dispatch gate.
//!
//! Edge-triggered readiness can fire again for a connection while a worker is
//! still handling its previous notification. The gate makes sure only one
//! handler invocation per connection is in flight: a second notification is
//! folded into a "pending" mark, and the worker that owns the connection runs
//! the handler once more before letting go.
//!
//! ```text
//!            try_acquire            try_acquire
//!   idle ──────────────▶ Running ──────────────▶ RunningWithPending
//!    ▲                     │  ▲                         │
//!    └──── release ────────┘  └──── release (Rerun) ────┘
//! ```

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chat_core::ConnectionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Running,
    RunningWithPending,
}

/// What the owner should do after finishing an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// Nothing arrived meanwhile; the connection is idle again.
    Released,
    /// Readiness arrived meanwhile; invoke the handler again.
    Rerun,
}

/// Tracks which connections have a handler invocation in flight.
#[derive(Debug, Default)]
pub struct DispatchGate {
    slots: Mutex<HashMap<ConnectionId, Slot>>,
}

impl DispatchGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ConnectionId, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claims `id` for a new invocation.
    ///
    /// Returns true if the caller now owns the connection and must dispatch
    /// it; false if an invocation is already in flight (it will rerun).
    pub fn try_acquire(&self, id: ConnectionId) -> bool {
        match self.lock().entry(id) {
            Entry::Vacant(slot) => {
                slot.insert(Slot::Running);
                true
            }
            Entry::Occupied(mut slot) => {
                slot.insert(Slot::RunningWithPending);
                false
            }
        }
    }

    /// Called by the owner after each invocation.
    pub fn release(&self, id: ConnectionId) -> Release {
        match self.lock().entry(id) {
            Entry::Occupied(mut slot) if *slot.get() == Slot::RunningWithPending => {
                slot.insert(Slot::Running);
                Release::Rerun
            }
            Entry::Occupied(slot) => {
                slot.remove();
                Release::Released
            }
            Entry::Vacant(_) => Release::Released,
        }
    }

    /// Drops any claim on `id`, e.g. when the task could not be submitted.
    pub fn abandon(&self, id: ConnectionId) {
        self.lock().remove(&id);
    }

    /// Whether an invocation for `id` is in flight.
    pub fn is_busy(&self, id: ConnectionId) -> bool {
        self.lock().contains_key(&id)
    }

    /// Number of connections with an invocation in flight.
    pub fn in_flight(&self) -> usize {
        self.lock().len()
    }

    /// Runs `invoke` for a connection the caller has acquired, once per
    /// pending readiness, until the gate goes idle.
    ///
    /// `invoke` returns whether the connection is still open. A closed
    /// connection or a panic inside `invoke` drops the claim.
    pub fn run_owned(&self, id: ConnectionId, mut invoke: impl FnMut() -> bool) {
        let mut claim = Claim {
            gate: self,
            id,
            armed: true,
        };
        loop {
            if !invoke() {
                return;
            }
            if self.release(id) == Release::Released {
                claim.armed = false;
                return;
            }
        }
    }
}

/// Abandons the gate entry on drop unless disarmed.
struct Claim<'a> {
    gate: &'a DispatchGate,
    id: ConnectionId,
    armed: bool,
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.gate.abandon(self.id);
        }
    }
}
