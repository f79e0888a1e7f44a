//! In-memory store for testing.

use crate::error::{StorageError, StorageResult};
use crate::store::KvStore;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// An in-memory key/value store.
///
/// This store keeps all rows in a sorted map and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Caches that don't need to survive a restart
///
/// # Thread Safety
///
/// This store is thread-safe and can be shared across threads.
///
/// # Example
///
/// ```rust
/// use tessera_storage::{InMemoryStore, KvStore};
///
/// let store = InMemoryStore::new();
/// store.insert("a", b"1").unwrap();
/// assert!(store.insert("a", b"2").is_err());
/// assert_eq!(store.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    rows: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    /// Returns true if the store holds no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    /// Returns a copy of the raw stored bytes for `key`.
    ///
    /// Useful for asserting on what actually reached the store
    /// (for example, that a value was encrypted).
    #[must_use]
    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.rows.read().get(key).cloned()
    }

    /// Removes every row.
    pub fn clear(&self) {
        self.rows.write().clear();
    }
}

impl KvStore for InMemoryStore {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.rows.read().get(key).cloned())
    }

    fn put(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        self.rows.write().insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn insert(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        let mut rows = self.rows.write();
        if rows.contains_key(key) {
            return Err(StorageError::duplicate_key(key));
        }
        rows.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        Ok(self.rows.write().remove(key).is_some())
    }

    fn scan_prefix(&self, prefix: &str) -> StorageResult<Vec<(String, Vec<u8>)>> {
        let rows = self.rows.read();
        Ok(rows
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn flush(&self) -> StorageResult<()> {
        // Nothing buffered
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ConstraintKind;

    #[test]
    fn memory_new_is_empty() {
        let store = InMemoryStore::new();
        assert!(store.is_empty());
        assert_eq!(store.get("missing").unwrap(), None);
    }

    #[test]
    fn memory_put_overwrites() {
        let store = InMemoryStore::new();
        store.put("k", b"one").unwrap();
        store.put("k", b"two").unwrap();
        assert_eq!(store.get("k").unwrap(), Some(b"two".to_vec()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn memory_insert_rejects_duplicates() {
        let store = InMemoryStore::new();
        store.insert("k", b"one").unwrap();

        let err = store.insert("k", b"two").unwrap_err();
        assert!(matches!(
            err,
            StorageError::Constraint {
                kind: ConstraintKind::Unique,
                ..
            }
        ));
        assert_eq!(store.get("k").unwrap(), Some(b"one".to_vec()));
    }

    #[test]
    fn memory_delete_reports_presence() {
        let store = InMemoryStore::new();
        store.put("k", b"v").unwrap();
        assert!(store.delete("k").unwrap());
        assert!(!store.delete("k").unwrap());
    }

    #[test]
    fn memory_scan_prefix_is_ordered_and_bounded() {
        let store = InMemoryStore::new();
        store.put("notes/2", b"b").unwrap();
        store.put("notes/1", b"a").unwrap();
        store.put("other/1", b"x").unwrap();
        store.put("notes0", b"y").unwrap();

        let rows = store.scan_prefix("notes/").unwrap();
        let keys: Vec<_> = rows.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["notes/1", "notes/2"]);
    }

    #[test]
    fn memory_clear() {
        let store = InMemoryStore::new();
        store.put("k", b"v").unwrap();
        store.clear();
        assert!(store.is_empty());
    }
}
