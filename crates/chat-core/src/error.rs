//! Domain-specific error types following panic-free policy.

use thiserror::Error;

/// Errors that can occur in domain operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Display names must contain at least one character
    #[error("Display name must not be empty")]
    EmptyName,
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
