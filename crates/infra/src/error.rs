//! Errors surfaced by the service layer.

use thiserror::Error;

use workshop_core::DomainError;

use crate::store::StoreError;

/// Closed set of error kinds callers branch on.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    InvalidTransition,
    Conflict,
    NotFound,
    Store,
}

/// Service operation error.
///
/// Domain failures keep their kind; a version mismatch reported by the store
/// becomes [`ServiceError::Conflict`]; every other store failure is passed
/// through unchanged in [`ServiceError::Store`].
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid status transition from '{from}' to '{to}'")]
    InvalidTransition { from: String, to: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    #[error(transparent)]
    Store(StoreError),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Validation(_) => ErrorKind::Validation,
            ServiceError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            ServiceError::Conflict(_) => ErrorKind::Conflict,
            ServiceError::NotFound { .. } => ErrorKind::NotFound,
            ServiceError::Store(_) => ErrorKind::Store,
        }
    }
}

impl From<DomainError> for ServiceError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
                ServiceError::Validation(msg)
            }
            DomainError::InvalidTransition { from, to } => {
                ServiceError::InvalidTransition { from, to }
            }
            DomainError::Conflict(msg) => ServiceError::Conflict(msg),
            DomainError::NotFound { kind, id } => ServiceError::NotFound { kind, id },
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Concurrency(msg) => ServiceError::Conflict(msg),
            StoreError::Missing { kind, id } => ServiceError::NotFound {
                kind: kind.as_str(),
                id,
            },
            other => ServiceError::Store(other),
        }
    }
}
