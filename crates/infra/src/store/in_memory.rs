use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use workshop_core::ExpectedVersion;

use super::r#trait::{DataStore, EntityKind, StoreError, record_id, record_version};

/// In-memory record store.
///
/// Intended for tests/dev. Records of a collection are kept ordered by id so
/// `get_all` is deterministic.
#[derive(Debug, Default)]
pub struct InMemoryDataStore {
    collections: RwLock<HashMap<EntityKind, BTreeMap<String, JsonValue>>>,
}

impl InMemoryDataStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn poisoned() -> StoreError {
        StoreError::Unavailable("lock poisoned".to_string())
    }
}

#[async_trait]
impl DataStore for InMemoryDataStore {
    async fn get_all(&self, kind: EntityKind) -> Result<Vec<JsonValue>, StoreError> {
        let collections = self.collections.read().map_err(|_| Self::poisoned())?;
        Ok(collections
            .get(&kind)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn get_by_id(&self, kind: EntityKind, id: &str) -> Result<Option<JsonValue>, StoreError> {
        let collections = self.collections.read().map_err(|_| Self::poisoned())?;
        Ok(collections
            .get(&kind)
            .and_then(|records| records.get(id))
            .cloned())
    }

    async fn insert(
        &self,
        kind: EntityKind,
        mut record: JsonValue,
    ) -> Result<JsonValue, StoreError> {
        let id = record_id(&record)?.to_string();
        let object = record
            .as_object_mut()
            .ok_or_else(|| StoreError::Serialization("record is not an object".to_string()))?;
        object.insert("version".to_string(), JsonValue::from(1u64));

        let mut collections = self.collections.write().map_err(|_| Self::poisoned())?;
        let records = collections.entry(kind).or_default();
        if records.contains_key(&id) {
            return Err(StoreError::Duplicate { kind, id });
        }
        records.insert(id, record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        kind: EntityKind,
        id: &str,
        partial: JsonValue,
        expected: ExpectedVersion,
    ) -> Result<JsonValue, StoreError> {
        let JsonValue::Object(changes) = partial else {
            return Err(StoreError::Serialization("partial update is not an object".to_string()));
        };

        let mut collections = self.collections.write().map_err(|_| Self::poisoned())?;
        let stored = collections
            .get_mut(&kind)
            .and_then(|records| records.get_mut(id))
            .ok_or_else(|| StoreError::Missing {
                kind,
                id: id.to_string(),
            })?;

        let current = record_version(stored);
        if !expected.matches(current) {
            return Err(StoreError::Concurrency(format!(
                "{kind} '{id}': expected {expected:?}, found {current}"
            )));
        }

        let object = stored.as_object_mut().ok_or_else(|| {
            StoreError::Serialization("stored record is not an object".to_string())
        })?;
        for (key, value) in changes {
            if key != "id" && key != "version" {
                object.insert(key, value);
            }
        }
        object.insert("version".to_string(), JsonValue::from(current + 1));
        Ok(stored.clone())
    }

    async fn query(
        &self,
        kind: EntityKind,
        predicate: &(dyn for<'r> Fn(&'r JsonValue) -> bool + Send + Sync),
    ) -> Result<Vec<JsonValue>, StoreError> {
        let collections = self.collections.read().map_err(|_| Self::poisoned())?;
        Ok(collections
            .get(&kind)
            .map(|records| records.values().filter(|r| predicate(r)).cloned().collect())
            .unwrap_or_default())
    }
}
