//! Chatroom Core - Shared types for the chat server
//!
//! This crate provides the domain types shared between
//! the server (chatd) and its protocol layer.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod connection;
pub mod error;
pub mod session;

// Re-exports for convenience
pub use connection::{ConnectionId, ConnectionIdAllocator};
pub use error::{DomainError, DomainResult};
pub use session::{validate_name, SessionState};
