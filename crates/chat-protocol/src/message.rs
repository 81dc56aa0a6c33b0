//! Server-originated texts.
//!
//! Every text the server sends is built here so the exact wording lives in
//! one place. On the wire each text is followed by a single `\n`.

use std::fmt;

use crate::time::Timestamp;

/// Sent to every connection right after it is accepted.
pub const CONNECT_PROMPT: &str = "connected — please enter a name";

/// Sent when a requested name is empty or already held.
pub const NAME_IN_USE: &str = "name already in use, choose another";

/// A text sent from the server to one or more clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerText {
    /// Asks a fresh connection for its display name.
    Prompt,

    /// Confirms a name claim to the claimant.
    Welcome { name: String },

    /// Tells everyone else that a client claimed its name.
    Joined { name: String },

    /// Tells everyone else that a client left with `/exit`.
    Left { name: String },

    /// Name claim or rename refused.
    NameInUse,

    /// `/whisper` target has no live session.
    NotFound { name: String },

    /// Rename notice, sent to every session.
    Renamed { old: String, new: String },

    /// Reply to `/list`.
    NameList { names: Vec<String> },

    /// Ordinary chat line.
    Chat {
        from: String,
        at: Timestamp,
        text: String,
    },

    /// Private line delivered to both ends of a whisper.
    Whisper {
        at: Timestamp,
        from: String,
        to: String,
        text: String,
    },
}

impl ServerText {
    /// Renders the text with its trailing line terminator.
    pub fn to_wire(&self) -> String {
        format!("{self}\n")
    }
}

impl fmt::Display for ServerText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prompt => f.write_str(CONNECT_PROMPT),
            Self::Welcome { name } => write!(f, "welcome, {name}!"),
            Self::Joined { name } => write!(f, "{name} has joined"),
            Self::Left { name } => write!(f, "{name} has left"),
            Self::NameInUse => f.write_str(NAME_IN_USE),
            Self::NotFound { name } => write!(f, "{name} not found"),
            Self::Renamed { old, new } => write!(f, "{old} changed name to {new}"),
            Self::NameList { names } => f.write_str(&names.join("\n")),
            Self::Chat { from, at, text } => write!(f, "{from} [{at}]: {text}"),
            Self::Whisper { at, from, to, text } => {
                write!(f, "whisper [{at}] ({from} -> {to}): {text}")
            }
        }
    }
}
