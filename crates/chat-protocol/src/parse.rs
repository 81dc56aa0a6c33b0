//! Parsing inbound client payloads.

use std::borrow::Cow;

/// Turns the bytes of one read into message text.
///
/// Invalid UTF-8 is replaced rather than rejected, and a trailing line
/// terminator (`\n` or `\r\n`) is stripped so line-based clients and raw
/// clients look the same. Nothing else is trimmed.
pub fn decode_payload(bytes: &[u8]) -> Cow<'_, str> {
    match String::from_utf8_lossy(bytes) {
        Cow::Borrowed(text) => Cow::Borrowed(strip_line_ending(text)),
        Cow::Owned(text) => Cow::Owned(strip_line_ending(&text).to_string()),
    }
}

fn strip_line_ending(text: &str) -> &str {
    let text = text.strip_suffix('\n').unwrap_or(text);
    text.strip_suffix('\r').unwrap_or(text)
}

/// A message from a client that has already claimed a name.
///
/// A connection's first message is always a name request and is never
/// parsed as a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    /// `/exit`: leave the room.
    Exit,

    /// `/list`: show every claimed name.
    List,

    /// `/whisper <to> <text>`: private message.
    Whisper { to: &'a str, text: &'a str },

    /// `/whisper` without both a target and a text. Ignored by the server.
    MalformedWhisper,

    /// `/name <new>`: change display name. An absent argument yields an
    /// empty name, which the registry refuses.
    Rename { name: &'a str },

    /// Anything else is broadcast as chat.
    Chat(&'a str),
}

impl<'a> Command<'a> {
    /// Classifies one message by its leading token.
    pub fn parse(message: &'a str) -> Self {
        match message {
            "/exit" => return Self::Exit,
            "/list" => return Self::List,
            _ => {}
        }

        if let Some(rest) = command_argument(message, "/whisper") {
            return match parse_whisper(rest) {
                Some((to, text)) => Self::Whisper { to, text },
                None => Self::MalformedWhisper,
            };
        }

        if let Some(name) = command_argument(message, "/name") {
            return Self::Rename { name };
        }

        Self::Chat(message)
    }
}

/// If `message` starts with `keyword` as a whole token, returns what
/// follows the separating space (empty when the keyword stands alone).
fn command_argument<'a>(message: &'a str, keyword: &str) -> Option<&'a str> {
    let rest = message.strip_prefix(keyword)?;
    if rest.is_empty() {
        return Some(rest);
    }
    rest.strip_prefix(' ')
}

/// Splits `<to> <text>` on the first space. Both parts must be present;
/// the text may be empty if the separator is the last character.
fn parse_whisper(rest: &str) -> Option<(&str, &str)> {
    if rest.is_empty() {
        return None;
    }
    rest.split_once(' ')
}
