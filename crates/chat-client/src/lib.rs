//! chat-client - terminal client for the chatroom server
//!
//! The client keeps two loops running over one TCP connection:
//!
//! 1. **Receive loop**: copies everything the server sends to the output
//! 2. **Send loop**: forwards each input line to the server
//!
//! Both loops share a `CancellationToken`; whichever side ends the session
//! stops the other.

pub mod client;
pub mod error;

pub use client::{ChatClient, ClientConfig, SessionEnd, DEFAULT_PORT};
pub use error::{ClientError, Result};
