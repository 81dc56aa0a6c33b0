//! Error types for the chat client.
//!
//! **Panic-Free Policy:** This module follows the project's panic-free guidelines.
//! No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, or `todo!()`.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Client errors.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Could not reach the server.
    ///
    /// Usually means no server is listening at `addr`; check the address or
    /// start `chatd`.
    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// I/O failure on an established connection or on the terminal.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Convenience alias used throughout the client.
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_error_names_address() {
        let err = ClientError::Connect {
            addr: "127.0.0.1:8080".parse().unwrap(),
            source: io::Error::from(io::ErrorKind::ConnectionRefused),
        };
        let message = err.to_string();
        assert!(message.contains("127.0.0.1:8080"));
    }

    #[test]
    fn test_io_error_from() {
        let err: ClientError = io::Error::from(io::ErrorKind::BrokenPipe).into();
        assert!(matches!(err, ClientError::Io(_)));
    }
}
