//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Deterministic business failure raised by an aggregate or a pure domain function.
///
/// Infrastructure failures (storage, transport) never show up here; they are
/// mapped separately by the dispatcher.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Input was malformed, missing, or out of range.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The command is well-formed but not allowed in the current state.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("invalid identifier: {0}")]
    InvalidId(String),

    #[error("not found")]
    NotFound,

    /// Duplicate or stale write.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unauthorized")]
    Unauthorized,
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    /// Shorthand for the very common "aggregate has not been created yet" rejection.
    pub fn not_created(what: &str) -> Self {
        Self::InvariantViolation(format!("{what} does not exist"))
    }
}
