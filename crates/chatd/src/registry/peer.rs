//! The transport seam between the registry and a client socket.

use std::io;

/// One client's transport, as seen by the registry and protocol handler.
///
/// Implementations take `&self` everywhere so a peer can be shared between
/// the registry (which broadcasts to it) and the worker currently reading
/// from it.
pub trait Peer: Send + Sync + 'static {
    /// Writes `text` in full, best effort. Non-blocking transports may fail
    /// with `WouldBlock` when the peer is not draining its socket.
    fn send(&self, text: &str) -> io::Result<()>;

    /// One non-blocking read into `buf`. `Ok(0)` means the peer hung up.
    fn recv(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Releases the transport. Called by the registry exactly when the
    /// session is removed; must tolerate repeated calls.
    fn close(&self);
}
