//! Session state for a connected client.

use std::fmt;

use crate::error::{DomainError, DomainResult};

/// Where a connection is in its naming lifecycle.
///
/// ```text
/// Unnamed ──(valid, unique name)──▶ Named ──(/exit, EOF, error)──▶ closed
/// ```
///
/// The closed state is represented by the session's absence from the
/// registry, so it has no variant here.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Accepted, waiting for the first message to claim a display name.
    #[default]
    Unnamed,
    /// Holds a unique display name.
    Named(String),
}

impl SessionState {
    /// Returns the display name, if one has been claimed.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Unnamed => None,
            Self::Named(name) => Some(name),
        }
    }

    /// Whether the session has claimed a display name.
    pub fn is_named(&self) -> bool {
        matches!(self, Self::Named(_))
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unnamed => write!(f, "unnamed"),
            Self::Named(name) => write!(f, "named({name})"),
        }
    }
}

/// Checks that `name` is acceptable as a display name.
///
/// Uniqueness is not checked here; that needs the registry.
pub fn validate_name(name: &str) -> DomainResult<()> {
    if name.is_empty() {
        return Err(DomainError::EmptyName);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_unnamed() {
        let state = SessionState::default();
        assert!(!state.is_named());
        assert_eq!(state.name(), None);
    }

    #[test]
    fn test_named_state_exposes_name() {
        let state = SessionState::Named("Alice".to_string());
        assert!(state.is_named());
        assert_eq!(state.name(), Some("Alice"));
        assert_eq!(state.to_string(), "named(Alice)");
    }

    #[test]
    fn test_validate_name() {
        assert_eq!(validate_name(""), Err(DomainError::EmptyName));
        assert!(validate_name("Bob").is_ok());
        // Interior and leading whitespace is kept verbatim.
        assert!(validate_name(" Bob Jr").is_ok());
    }
}
