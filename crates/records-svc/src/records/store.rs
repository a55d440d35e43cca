//! [`RecordStore`]: the persistence seam, and its in-process implementation.
//!
//! The store only ever sees [`StoredRecord`]s, whose sensitive fields are
//! already encoded (or legacy). It never encodes or decodes anything itself.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use super::model::{RecordKind, StoredRecord};

/// Errors produced by a record store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record with this id exists.
    #[error("record {0} not found")]
    NotFound(Uuid),

    /// A record with this id already exists.
    #[error("record {0} already exists")]
    Conflict(Uuid),

    /// The backing store cannot serve requests.
    #[error("record store unavailable: {0}")]
    Unavailable(String),
}

/// Document persistence used by the repository.
#[cfg_attr(test, mockall::automock)]
pub trait RecordStore: Send + Sync {
    /// Persist a new record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] if the id is taken.
    fn insert(&self, record: StoredRecord) -> Result<(), StoreError>;

    /// Fetch one record by id.
    fn get(&self, id: Uuid) -> Result<Option<StoredRecord>, StoreError>;

    /// Overwrite an existing record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no record has that id.
    fn replace(&self, record: StoredRecord) -> Result<(), StoreError>;

    /// Overwrite an existing record only if its stored `updated_at` still
    /// equals `expected_updated_at`.
    ///
    /// Returns `false`, writing nothing, when the record changed in between.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no record has that id.
    fn replace_if_unchanged(
        &self,
        record: StoredRecord,
        expected_updated_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// All records, or only those of `kind`, ordered by creation time.
    fn list(&self, kind: Option<RecordKind>) -> Result<Vec<StoredRecord>, StoreError>;

    /// Number of records held.
    fn count(&self) -> Result<usize, StoreError>;
}

/// Process-local [`RecordStore`] backed by a `HashMap`.
///
/// Cheap to clone; clones share the same map.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<HashMap<Uuid, StoredRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Unavailable("lock poisoned".into())
}

impl RecordStore for MemoryStore {
    fn insert(&self, record: StoredRecord) -> Result<(), StoreError> {
        let mut map = self.inner.write().map_err(poisoned)?;
        if map.contains_key(&record.id) {
            return Err(StoreError::Conflict(record.id));
        }
        map.insert(record.id, record);
        Ok(())
    }

    fn get(&self, id: Uuid) -> Result<Option<StoredRecord>, StoreError> {
        let map = self.inner.read().map_err(poisoned)?;
        Ok(map.get(&id).cloned())
    }

    fn replace(&self, record: StoredRecord) -> Result<(), StoreError> {
        let mut map = self.inner.write().map_err(poisoned)?;
        match map.get_mut(&record.id) {
            Some(slot) => {
                *slot = record;
                Ok(())
            }
            None => Err(StoreError::NotFound(record.id)),
        }
    }

    fn replace_if_unchanged(
        &self,
        record: StoredRecord,
        expected_updated_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut map = self.inner.write().map_err(poisoned)?;
        let slot = map
            .get_mut(&record.id)
            .ok_or(StoreError::NotFound(record.id))?;
        if slot.updated_at != expected_updated_at {
            return Ok(false);
        }
        *slot = record;
        Ok(true)
    }

    fn list(&self, kind: Option<RecordKind>) -> Result<Vec<StoredRecord>, StoreError> {
        let map = self.inner.read().map_err(poisoned)?;
        let mut records: Vec<StoredRecord> = map
            .values()
            .filter(|r| kind.map_or(true, |k| r.kind == k))
            .cloned()
            .collect();
        records.sort_by_key(|r| (r.created_at, r.id));
        Ok(records)
    }

    fn count(&self) -> Result<usize, StoreError> {
        Ok(self.inner.read().map_err(poisoned)?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::model::FormatVersion;
    use chrono::Utc;

    fn record(kind: RecordKind) -> StoredRecord {
        let now = Utc::now();
        StoredRecord {
            id: Uuid::new_v4(),
            kind,
            format: FormatVersion::Legacy,
            key_id: None,
            document: serde_json::json!({"phone": "5551234567"}),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn initially_empty() {
        let store = MemoryStore::new();
        assert_eq!(store.count().unwrap(), 0);
        assert!(store.get(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn insert_and_get() {
        let store = MemoryStore::new();
        let r = record(RecordKind::Patient);
        store.insert(r.clone()).unwrap();
        assert_eq!(store.get(r.id).unwrap(), Some(r));
    }

    #[test]
    fn duplicate_insert_conflicts() {
        let store = MemoryStore::new();
        let r = record(RecordKind::Patient);
        store.insert(r.clone()).unwrap();
        assert!(matches!(store.insert(r), Err(StoreError::Conflict(_))));
    }

    #[test]
    fn replace_requires_existing() {
        let store = MemoryStore::new();
        let r = record(RecordKind::Doctor);
        assert!(matches!(
            store.replace(r.clone()),
            Err(StoreError::NotFound(_))
        ));
        store.insert(r.clone()).unwrap();
        let mut updated = r.clone();
        updated.document = serde_json::json!({"phone": "changed"});
        store.replace(updated.clone()).unwrap();
        assert_eq!(store.get(r.id).unwrap(), Some(updated));
    }

    #[test]
    fn list_filters_by_kind() {
        let store = MemoryStore::new();
        store.insert(record(RecordKind::Patient)).unwrap();
        store.insert(record(RecordKind::Measurement)).unwrap();
        store.insert(record(RecordKind::Measurement)).unwrap();
        assert_eq!(store.list(None).unwrap().len(), 3);
        assert_eq!(store.list(Some(RecordKind::Measurement)).unwrap().len(), 2);
        assert!(store.list(Some(RecordKind::Prescription)).unwrap().is_empty());
    }

    #[test]
    fn clones_share_state() {
        let store = MemoryStore::new();
        let other = store.clone();
        store.insert(record(RecordKind::Patient)).unwrap();
        assert_eq!(other.count().unwrap(), 1);
    }

    #[test]
    fn conditional_replace_detects_concurrent_write() {
        let store = MemoryStore::new();
        let original = record(RecordKind::Patient);
        store.insert(original.clone()).unwrap();

        let mut concurrent = original.clone();
        concurrent.document = serde_json::json!({"phone": "5559999999"});
        concurrent.updated_at = original.updated_at + chrono::Duration::seconds(1);
        store.replace(concurrent.clone()).unwrap();

        let mut stale = original.clone();
        stale.document = serde_json::json!({"phone": "rewritten"});
        assert!(!store
            .replace_if_unchanged(stale, original.updated_at)
            .unwrap());
        assert_eq!(store.get(original.id).unwrap(), Some(concurrent.clone()));

        let mut fresh = concurrent.clone();
        fresh.document = serde_json::json!({"phone": "rewritten"});
        assert!(store
            .replace_if_unchanged(fresh.clone(), concurrent.updated_at)
            .unwrap());
        assert_eq!(store.get(original.id).unwrap(), Some(fresh));
    }

    #[test]
    fn conditional_replace_requires_existing() {
        let store = MemoryStore::new();
        let r = record(RecordKind::Doctor);
        let at = r.updated_at;
        assert!(matches!(
            store.replace_if_unchanged(r, at),
            Err(StoreError::NotFound(_))
        ));
    }
}
