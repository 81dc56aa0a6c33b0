//! chatd - multi-client TCP chat server
//!
//! This crate provides the server side of the chatroom:
//! - `config` - Server configuration, defaults and TOML overlay
//! - `pool` - Fixed-size worker pool executing reactor tasks
//! - `registry` - Session registry shared by all workers
//! - `handler` - Chat protocol state machine per connection
//! - `server` - Edge-triggered reactor, TCP peers and dispatch gate
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        chatd                                │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐  tasks  ┌─────────────────────────┐    │
//! │  │   ChatServer    │────────▶│      WorkerPool         │    │
//! │  │ (mio reactor)   │         │   (N worker threads)    │    │
//! │  └────────┬────────┘         └────────────┬────────────┘    │
//! │           │ accept                        │ handle_readable │
//! │           ▼                               ▼                 │
//! │  ┌─────────────────┐         ┌─────────────────────────┐    │
//! │  │    TcpPeer      │◀────────│    ProtocolHandler      │    │
//! │  │ (per client)    │  send   │                         │    │
//! │  └─────────────────┘         └────────────┬────────────┘    │
//! │           ▲                               │                 │
//! │           │ broadcast                     ▼                 │
//! │           │                  ┌─────────────────────────┐    │
//! │           └──────────────────│    SessionRegistry      │    │
//! │                              │   (one lock, names)     │    │
//! │                              └─────────────────────────┘    │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows a panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Poisoned locks are recovered, panicking tasks are contained by the pool

pub mod config;
pub mod handler;
pub mod pool;
pub mod registry;
pub mod server;

pub use config::{ConfigError, ServerConfig};
pub use server::{ChatServer, ServerError, ShutdownHandle};
