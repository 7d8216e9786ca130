//! In-memory document store for testing.

use crate::driver::{DocumentStore, ID_FIELD};
use crate::error::{StoreError, StoreResult};
use docmap_document::{Document, Value};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// An in-memory document store.
///
/// Stores all documents in memory, keyed by collection and identifier.
/// Suitable for unit tests, integration tests, and ephemeral data.
///
/// The store counts its read operations so tests can observe *when*
/// reference resolution actually hits the driver (lazy vs eager).
///
/// # Thread Safety
///
/// The store is thread-safe and can be shared across threads.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<(Value, Document)>>>,
    find_one_calls: AtomicU64,
    find_many_calls: AtomicU64,
}

impl MemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns how many `find_one` calls the store has served.
    #[must_use]
    pub fn find_one_calls(&self) -> u64 {
        self.find_one_calls.load(Ordering::Relaxed)
    }

    /// Returns how many `find_many` calls the store has served.
    #[must_use]
    pub fn find_many_calls(&self) -> u64 {
        self.find_many_calls.load(Ordering::Relaxed)
    }

    /// Returns the total number of read calls served.
    #[must_use]
    pub fn read_calls(&self) -> u64 {
        self.find_one_calls() + self.find_many_calls()
    }

    /// Returns a snapshot of all documents in a collection.
    #[must_use]
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        self.collections
            .read()
            .get(collection)
            .map(|entries| entries.iter().map(|(_, d)| d.clone()).collect())
            .unwrap_or_default()
    }

    /// Removes all documents from all collections.
    pub fn clear(&self) {
        self.collections.write().clear();
    }
}

impl DocumentStore for MemoryStore {
    fn find_one(&self, collection: &str, id: &Value) -> StoreResult<Option<Document>> {
        self.find_one_calls.fetch_add(1, Ordering::Relaxed);
        let collections = self.collections.read();
        Ok(collections
            .get(collection)
            .and_then(|entries| entries.iter().find(|(k, _)| k == id))
            .map(|(_, d)| d.clone()))
    }

    fn find_many(&self, collection: &str, ids: &[Value]) -> StoreResult<Vec<Document>> {
        self.find_many_calls.fetch_add(1, Ordering::Relaxed);
        let collections = self.collections.read();
        let Some(entries) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(entries
            .iter()
            .filter(|(k, _)| ids.contains(k))
            .map(|(_, d)| d.clone())
            .collect())
    }

    fn insert(&self, collection: &str, document: Document) -> StoreResult<()> {
        let id = document
            .get(ID_FIELD)
            .cloned()
            .ok_or_else(|| StoreError::missing_id(collection))?;

        let mut collections = self.collections.write();
        let entries = collections.entry(collection.to_string()).or_default();
        if entries.iter().any(|(k, _)| *k == id) {
            return Err(StoreError::duplicate_id(collection, format!("{id:?}")));
        }
        entries.push((id, document));
        Ok(())
    }

    fn replace(
        &self,
        collection: &str,
        id: &Value,
        expected_version: Option<(&str, i64)>,
        document: Document,
    ) -> StoreResult<u64> {
        let mut collections = self.collections.write();
        let Some(entries) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let Some(slot) = entries.iter_mut().find(|(k, _)| k == id) else {
            return Ok(0);
        };
        if let Some((field, expected)) = expected_version {
            if slot.1.get(field).and_then(Value::as_int) != Some(expected) {
                return Ok(0);
            }
        }
        slot.1 = document;
        Ok(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docmap_document::EntityId;

    fn doc(id: EntityId, name: &str, version: i64) -> Document {
        let mut doc = Document::new();
        doc.insert(ID_FIELD, Value::Id(id));
        doc.insert("name", Value::from(name));
        doc.insert("version", Value::Int(version));
        doc
    }

    #[test]
    fn insert_and_find_one() {
        let store = MemoryStore::new();
        let id = EntityId::new();
        store.insert("users", doc(id, "Alice", 1)).unwrap();

        let found = store.find_one("users", &Value::Id(id)).unwrap().unwrap();
        assert_eq!(found.get("name"), Some(&Value::from("Alice")));
        assert_eq!(store.find_one_calls(), 1);
    }

    #[test]
    fn insert_without_id_fails() {
        let store = MemoryStore::new();
        let err = store.insert("users", Document::new()).unwrap_err();
        assert!(matches!(err, StoreError::MissingId { .. }));
    }

    #[test]
    fn insert_duplicate_id_fails() {
        let store = MemoryStore::new();
        let id = EntityId::new();
        store.insert("users", doc(id, "Alice", 1)).unwrap();
        let err = store.insert("users", doc(id, "Bob", 1)).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateId { .. }));
    }

    #[test]
    fn find_many_filters_by_id_set() {
        let store = MemoryStore::new();
        let ids: Vec<EntityId> = (0..3).map(|_| EntityId::new()).collect();
        for (i, id) in ids.iter().enumerate() {
            store
                .insert("users", doc(*id, &format!("user{i}"), 1))
                .unwrap();
        }

        let wanted = vec![Value::Id(ids[0]), Value::Id(ids[2])];
        let found = store.find_many("users", &wanted).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(store.find_many_calls(), 1);
    }

    #[test]
    fn replace_unconditional() {
        let store = MemoryStore::new();
        let id = EntityId::new();
        store.insert("users", doc(id, "Alice", 1)).unwrap();

        let modified = store
            .replace("users", &Value::Id(id), None, doc(id, "Alicia", 1))
            .unwrap();
        assert_eq!(modified, 1);

        let found = store.find_one("users", &Value::Id(id)).unwrap().unwrap();
        assert_eq!(found.get("name"), Some(&Value::from("Alicia")));
    }

    #[test]
    fn replace_missing_returns_zero() {
        let store = MemoryStore::new();
        let id = EntityId::new();
        let modified = store
            .replace("users", &Value::Id(id), None, doc(id, "Alice", 1))
            .unwrap();
        assert_eq!(modified, 0);
    }

    #[test]
    fn conditional_replace_checks_version() {
        let store = MemoryStore::new();
        let id = EntityId::new();
        store.insert("users", doc(id, "Alice", 3)).unwrap();

        // Stale expected version does not match.
        let modified = store
            .replace(
                "users",
                &Value::Id(id),
                Some(("version", 2)),
                doc(id, "Alicia", 3),
            )
            .unwrap();
        assert_eq!(modified, 0);

        // Correct expected version matches.
        let modified = store
            .replace(
                "users",
                &Value::Id(id),
                Some(("version", 3)),
                doc(id, "Alicia", 4),
            )
            .unwrap();
        assert_eq!(modified, 1);
    }
}
