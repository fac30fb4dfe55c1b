use async_trait::async_trait;
use serde_json::Value as JsonValue;
use thiserror::Error;

use workshop_core::ExpectedVersion;
use std::sync::Arc;

/// Record collections known to the store.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Orders,
    Appointments,
    /// Per-resource reservation sets that serialize bookings.
    ResourceSchedules,
    /// Named counters (order numbers).
    Sequences,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Orders => "orders",
            EntityKind::Appointments => "appointments",
            EntityKind::ResourceSchedules => "resource_schedules",
            EntityKind::Sequences => "sequences",
        }
    }
}

impl core::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Data store operation error.
///
/// These are **infrastructure errors** (storage, concurrency) as opposed to
/// domain errors (validation, transitions).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("optimistic concurrency check failed: {0}")]
    Concurrency(String),

    #[error("{kind} record '{id}' already exists")]
    Duplicate { kind: EntityKind, id: String },

    #[error("{kind} record '{id}' does not exist")]
    Missing { kind: EntityKind, id: String },

    #[error("malformed record: {0}")]
    Serialization(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Generic record store.
///
/// Records are JSON objects carrying a string `id` and an integer `version`.
///
/// ## Write semantics
///
/// - `insert` rejects an `id` already present in the collection and stores
///   the record at version 1.
/// - `update` merges the top-level keys of `partial` into the stored record
///   (`id` and `version` are ignored), after checking the stored version
///   against `expected`. The check and the write happen atomically and the
///   version is bumped by one.
///
/// Both return the record as stored.
#[async_trait]
pub trait DataStore: Send + Sync {
    async fn get_all(&self, kind: EntityKind) -> Result<Vec<JsonValue>, StoreError>;

    async fn get_by_id(&self, kind: EntityKind, id: &str) -> Result<Option<JsonValue>, StoreError>;

    async fn insert(&self, kind: EntityKind, record: JsonValue) -> Result<JsonValue, StoreError>;

    async fn update(
        &self,
        kind: EntityKind,
        id: &str,
        partial: JsonValue,
        expected: ExpectedVersion,
    ) -> Result<JsonValue, StoreError>;

    async fn query(
        &self,
        kind: EntityKind,
        predicate: &(dyn for<'r> Fn(&'r JsonValue) -> bool + Send + Sync),
    ) -> Result<Vec<JsonValue>, StoreError>;
}

#[async_trait]
impl<S> DataStore for Arc<S>
where
    S: DataStore + ?Sized,
{
    async fn get_all(&self, kind: EntityKind) -> Result<Vec<JsonValue>, StoreError> {
        (**self).get_all(kind).await
    }

    async fn get_by_id(&self, kind: EntityKind, id: &str) -> Result<Option<JsonValue>, StoreError> {
        (**self).get_by_id(kind, id).await
    }

    async fn insert(&self, kind: EntityKind, record: JsonValue) -> Result<JsonValue, StoreError> {
        (**self).insert(kind, record).await
    }

    async fn update(
        &self,
        kind: EntityKind,
        id: &str,
        partial: JsonValue,
        expected: ExpectedVersion,
    ) -> Result<JsonValue, StoreError> {
        (**self).update(kind, id, partial, expected).await
    }

    async fn query(
        &self,
        kind: EntityKind,
        predicate: &(dyn for<'r> Fn(&'r JsonValue) -> bool + Send + Sync),
    ) -> Result<Vec<JsonValue>, StoreError> {
        (**self).query(kind, predicate).await
    }
}

/// Read the `id` of a record.
pub(crate) fn record_id(record: &JsonValue) -> Result<&str, StoreError> {
    record
        .get("id")
        .and_then(JsonValue::as_str)
        .ok_or_else(|| StoreError::Serialization("record has no string 'id'".to_string()))
}

/// Read the `version` of a record (0 when absent).
pub(crate) fn record_version(record: &JsonValue) -> u64 {
    record.get("version").and_then(JsonValue::as_u64).unwrap_or(0)
}
