//! TCP transport for one accepted client.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr};
use std::os::fd::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mio::net::TcpStream;
use mio::unix::SourceFd;
use mio::{Interest, Registry, Token};
use tracing::debug;

use crate::registry::Peer;

/// A non-blocking client socket plus the poll registry it is armed with.
///
/// The stream is shared between the session registry and whichever worker is
/// reading from it, so readiness registration goes through the raw fd rather
/// than `&mut TcpStream`.
pub struct TcpPeer {
    stream: TcpStream,
    addr: SocketAddr,
    poll: Arc<Registry>,
    closed: AtomicBool,
}

impl TcpPeer {
    pub fn new(stream: TcpStream, addr: SocketAddr, poll: Arc<Registry>) -> Self {
        Self {
            stream,
            addr,
            poll,
            closed: AtomicBool::new(false),
        }
    }

    /// Registers the socket for edge-triggered read readiness under `token`.
    pub fn arm(&self, token: Token) -> io::Result<()> {
        let fd = self.stream.as_raw_fd();
        self.poll
            .register(&mut SourceFd(&fd), token, Interest::READABLE)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Peer for TcpPeer {
    fn send(&self, text: &str) -> io::Result<()> {
        if self.is_closed() {
            return Err(io::Error::from(io::ErrorKind::NotConnected));
        }
        (&self.stream).write_all(text.as_bytes())
    }

    fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        (&self.stream).read(buf)
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let fd = self.stream.as_raw_fd();
        if let Err(e) = self.poll.deregister(&mut SourceFd(&fd)) {
            debug!(peer = %self.addr, error = %e, "Deregister failed");
        }
        // The fd itself is released when the last reference drops, so a
        // worker still holding this peer never reads a recycled descriptor.
        if let Err(e) = self.stream.shutdown(Shutdown::Both) {
            debug!(peer = %self.addr, error = %e, "Socket shutdown failed");
        }
    }
}

impl std::fmt::Debug for TcpPeer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpPeer")
            .field("addr", &self.addr)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mio::{Events, Poll};
    use std::time::Duration;

    /// Connected pair: the server side as a `TcpPeer`, the client side as a
    /// plain blocking std stream.
    fn pair(poll: &Poll) -> (TcpPeer, std::net::TcpStream) {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let client = std::net::TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (accepted, addr) = listener.accept().unwrap();
        accepted.set_nonblocking(true).unwrap();

        let registry = Arc::new(poll.registry().try_clone().unwrap());
        let peer = TcpPeer::new(TcpStream::from_std(accepted), addr, registry);
        (peer, client)
    }

    #[test]
    fn test_send_reaches_client() {
        let poll = Poll::new().unwrap();
        let (peer, mut client) = pair(&poll);

        peer.send("hello\n").unwrap();

        let mut buf = [0u8; 16];
        let n = client.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello\n");
    }

    #[test]
    fn test_recv_would_block_when_idle() {
        let poll = Poll::new().unwrap();
        let (peer, _client) = pair(&poll);

        let mut buf = [0u8; 16];
        let err = peer.recv(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[test]
    fn test_armed_peer_reports_readable() {
        let mut poll = Poll::new().unwrap();
        let (peer, mut client) = pair(&poll);
        peer.arm(Token(7)).unwrap();

        client.write_all(b"ping").unwrap();

        let mut events = Events::with_capacity(4);
        poll.poll(&mut events, Some(Duration::from_secs(2))).unwrap();
        assert!(events.iter().any(|e| e.token() == Token(7) && e.is_readable()));

        let mut buf = [0u8; 16];
        assert_eq!(peer.recv(&mut buf).unwrap(), 4);
    }

    #[test]
    fn test_close_is_idempotent_and_hangs_up() {
        let poll = Poll::new().unwrap();
        let (peer, mut client) = pair(&poll);
        peer.arm(Token(3)).unwrap();

        peer.close();
        peer.close();

        assert!(peer.is_closed());
        assert!(peer.send("late").is_err());

        client
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(client.read(&mut buf).unwrap(), 0);
    }
}
