//! Aggregate root trait and optimistic concurrency primitives.

use crate::error::{DomainError, DomainResult};

/// Aggregate root marker + minimal interface.
///
/// Records that are mutated through a versioned write implement this so the
/// service layer can carry the version the caller observed.
pub trait AggregateRoot {
    /// Strongly-typed aggregate identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug + core::fmt::Display;

    /// Returns the aggregate identifier.
    fn id(&self) -> &Self::Id;

    /// Monotonically increasing version of the persisted record.
    ///
    /// Starts at 1 on insert and is bumped by the store on every accepted write.
    fn version(&self) -> u64;
}

/// Optimistic concurrency expectation for a write.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Skip version checking (migrations, internal bookkeeping).
    Any,
    /// Require the record to be at an exact version.
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }

    pub fn check(self, actual: u64) -> DomainResult<()> {
        if self.matches(actual) {
            Ok(())
        } else {
            Err(DomainError::conflict(format!(
                "optimistic concurrency check failed (expected: {self:?}, actual: {actual})"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_matches_every_version() {
        assert!(ExpectedVersion::Any.matches(0));
        assert!(ExpectedVersion::Any.matches(42));
    }

    #[test]
    fn exact_mismatch_is_a_conflict() {
        assert!(ExpectedVersion::Exact(3).check(3).is_ok());
        match ExpectedVersion::Exact(3).check(4) {
            Err(DomainError::Conflict(msg)) => assert!(msg.contains("actual: 4")),
            other => panic!("expected conflict, got {other:?}"),
        }
    }
}
