//! In-memory [`Peer`] for driving the registry and handler without sockets.
//! Compiled for unit tests only.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::peer::Peer;

/// Process-wide send counter, so sends to different peers can be ordered.
static SEND_SEQUENCE: AtomicUsize = AtomicUsize::new(0);

/// A scripted peer: inbound chunks are queued with [`push_inbound`], and
/// everything sent to it is recorded.
///
/// Each queued chunk is returned by exactly one `recv` call. With an empty
/// queue `recv` reports `WouldBlock`, or `Ok(0)` after [`hang_up`].
///
/// [`push_inbound`]: MemoryPeer::push_inbound
/// [`hang_up`]: MemoryPeer::hang_up
#[derive(Debug, Default)]
pub struct MemoryPeer {
    inbound: Mutex<VecDeque<Vec<u8>>>,
    sent: Mutex<Vec<String>>,
    send_stamps: Mutex<Vec<usize>>,
    hung_up: AtomicBool,
    fail_reads: AtomicBool,
    close_count: AtomicUsize,
}

impl MemoryPeer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues one chunk to be returned by a later `recv`.
    pub fn push_inbound(&self, bytes: impl Into<Vec<u8>>) {
        lock(&self.inbound).push_back(bytes.into());
    }

    /// Simulates the remote end closing its socket.
    pub fn hang_up(&self) {
        self.hung_up.store(true, Ordering::SeqCst);
    }

    /// Makes every later `recv` fail with `ConnectionReset`.
    pub fn fail_reads(&self) {
        self.fail_reads.store(true, Ordering::SeqCst);
    }

    /// Everything sent so far, one entry per `send` call.
    pub fn sent(&self) -> Vec<String> {
        lock(&self.sent).clone()
    }

    /// Global sequence number of each recorded send.
    pub fn send_stamps(&self) -> Vec<usize> {
        lock(&self.send_stamps).clone()
    }

    /// Drains and returns everything sent so far.
    pub fn take_sent(&self) -> Vec<String> {
        std::mem::take(&mut *lock(&self.sent))
    }

    pub fn is_closed(&self) -> bool {
        self.close_count() > 0
    }

    /// How many times `close` was called.
    pub fn close_count(&self) -> usize {
        self.close_count.load(Ordering::SeqCst)
    }
}

impl Peer for MemoryPeer {
    fn send(&self, text: &str) -> io::Result<()> {
        if self.is_closed() {
            return Err(io::Error::from(io::ErrorKind::NotConnected));
        }
        lock(&self.sent).push(text.to_string());
        lock(&self.send_stamps).push(SEND_SEQUENCE.fetch_add(1, Ordering::SeqCst));
        Ok(())
    }

    fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(io::Error::from(io::ErrorKind::ConnectionReset));
        }

        let mut inbound = lock(&self.inbound);
        let Some(mut chunk) = inbound.pop_front() else {
            if self.hung_up.load(Ordering::SeqCst) {
                return Ok(0);
            }
            return Err(io::Error::from(io::ErrorKind::WouldBlock));
        };

        let n = chunk.len().min(buf.len());
        let rest = chunk.split_off(n);
        if let Some(dst) = buf.get_mut(..n) {
            dst.copy_from_slice(&chunk);
        }
        if !rest.is_empty() {
            inbound.push_front(rest);
        }
        Ok(n)
    }

    fn close(&self) {
        self.close_count.fetch_add(1, Ordering::SeqCst);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recv_one_chunk_per_call() {
        let peer = MemoryPeer::new();
        peer.push_inbound("one");
        peer.push_inbound("two");

        let mut buf = [0u8; 16];
        assert_eq!(peer.recv(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], b"one");
        assert_eq!(peer.recv(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], b"two");
        assert_eq!(
            peer.recv(&mut buf).unwrap_err().kind(),
            io::ErrorKind::WouldBlock
        );
    }

    #[test]
    fn test_oversized_chunk_is_split() {
        let peer = MemoryPeer::new();
        peer.push_inbound("abcdef");

        let mut buf = [0u8; 4];
        assert_eq!(peer.recv(&mut buf).unwrap(), 4);
        assert_eq!(peer.recv(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"ef");
    }

    #[test]
    fn test_hang_up_after_queue_drains() {
        let peer = MemoryPeer::new();
        peer.push_inbound("last");
        peer.hang_up();

        let mut buf = [0u8; 16];
        assert_eq!(peer.recv(&mut buf).unwrap(), 4);
        assert_eq!(peer.recv(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_send_after_close_fails() {
        let peer = MemoryPeer::new();
        peer.close();
        assert!(peer.send("x").is_err());
        assert!(peer.sent().is_empty());
    }
}
