//! Chatroom Protocol - Text protocol spoken between clients and chatd
//!
//! The protocol is unframed text: one logical client message is the payload
//! of one socket read. This crate provides command parsing for inbound
//! payloads and builders for every fixed server-originated text.

pub mod message;
pub mod parse;
pub mod time;

pub use message::{ServerText, CONNECT_PROMPT, NAME_IN_USE};
pub use parse::{decode_payload, Command};
pub use time::Timestamp;
