//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Each variant is a distinct kind callers can branch on. Persistence failures
/// are not represented here; they belong to the infrastructure layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (negative price, quantity below one,
    /// percentage outside `[0, 100]`, non-positive duration, ...).
    #[error("validation failed: {0}")]
    Validation(String),

    /// The requested status is not reachable from the current one.
    #[error("invalid status transition from '{from}' to '{to}'")]
    InvalidTransition { from: String, to: String },

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// The targeted record does not exist.
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    /// A scheduling collision or a stale version.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_transition(from: impl core::fmt::Display, to: impl core::fmt::Display) -> Self {
        Self::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found(kind: &'static str, id: impl core::fmt::Display) -> Self {
        Self::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Whether this error reports malformed input (including bad identifiers).
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::InvalidId(_))
    }
}
