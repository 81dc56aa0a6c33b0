//! Connection handles.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Opaque identifier for one accepted client connection.
///
/// Handles are allocated from a monotonically increasing counter and are
/// never reused within a process, so a stale readiness event can never be
/// mistaken for a newer connection that happens to share an OS descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(usize);

impl ConnectionId {
    /// Wraps a raw handle value.
    pub const fn new(raw: usize) -> Self {
        Self(raw)
    }

    /// Returns the raw handle value (used as the readiness token).
    pub const fn as_usize(self) -> usize {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Hands out unique [`ConnectionId`]s.
///
/// Values below `first` are left free for the caller's own tokens
/// (listener, waker).
#[derive(Debug)]
pub struct ConnectionIdAllocator {
    next: AtomicUsize,
}

impl ConnectionIdAllocator {
    /// Creates an allocator whose first handle is `first`.
    pub const fn starting_at(first: usize) -> Self {
        Self {
            next: AtomicUsize::new(first),
        }
    }

    /// Allocates the next handle.
    pub fn allocate(&self) -> ConnectionId {
        ConnectionId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}
