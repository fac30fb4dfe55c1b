use std::marker::PhantomData;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use workshop_core::{AggregateRoot, ExpectedVersion};

use super::r#trait::{DataStore, EntityKind, StoreError};

/// A typed record persisted in one collection of the store.
pub trait StoredRecord: AggregateRoot + Serialize + DeserializeOwned + Send + Sync {
    const KIND: EntityKind;
}

/// Typed view over one collection of a [`DataStore`].
///
/// Converts between records and their JSON layout; all concurrency checks
/// stay in the store.
pub struct Repository<'a, S: ?Sized, R> {
    store: &'a S,
    _record: PhantomData<fn() -> R>,
}

impl<'a, S, R> Repository<'a, S, R>
where
    S: DataStore + ?Sized,
    R: StoredRecord,
{
    pub fn new(store: &'a S) -> Self {
        Self {
            store,
            _record: PhantomData,
        }
    }

    pub async fn find(&self, id: &R::Id) -> Result<Option<R>, StoreError> {
        self.store
            .get_by_id(R::KIND, &id.to_string())
            .await?
            .map(decode)
            .transpose()
    }

    pub async fn all(&self) -> Result<Vec<R>, StoreError> {
        self.store
            .get_all(R::KIND)
            .await?
            .into_iter()
            .map(decode)
            .collect()
    }

    pub async fn query(
        &self,
        predicate: &(dyn for<'r> Fn(&'r JsonValue) -> bool + Send + Sync),
    ) -> Result<Vec<R>, StoreError> {
        self.store
            .query(R::KIND, predicate)
            .await?
            .into_iter()
            .map(decode)
            .collect()
    }

    /// Insert a new record; the returned copy carries the stored version.
    pub async fn insert(&self, record: &R) -> Result<R, StoreError> {
        let stored = self.store.insert(R::KIND, encode(record)?).await?;
        decode(stored)
    }

    /// Write the full record back, expecting the stored version to be `expected`.
    pub async fn save(&self, record: &R, expected: ExpectedVersion) -> Result<R, StoreError> {
        let stored = self
            .store
            .update(R::KIND, &record.id().to_string(), encode(record)?, expected)
            .await?;
        decode(stored)
    }
}

fn encode<R: Serialize>(record: &R) -> Result<JsonValue, StoreError> {
    serde_json::to_value(record).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn decode<R: DeserializeOwned>(value: JsonValue) -> Result<R, StoreError> {
    serde_json::from_value(value).map_err(|e| StoreError::Serialization(e.to_string()))
}
