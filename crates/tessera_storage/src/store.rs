//! Key/value store trait definition.

use crate::error::StorageResult;
use std::sync::Arc;

/// A local persistent key/value store.
///
/// Stores are **opaque byte maps** keyed by strings. Callers own the
/// key layout (`<namespace>/<id>`) and the value encoding.
///
/// # Invariants
///
/// - `get` returns exactly the bytes last written under that key
/// - `insert` never overwrites; it fails with a unique constraint error
/// - `scan_prefix` returns rows in ascending key order
/// - `flush` makes all prior writes durable (no-op for memory stores)
///
/// # Implementors
///
/// - [`super::InMemoryStore`] - For testing
/// - [`super::FileStore`] - For persistent storage
/// - [`super::EncryptedStore`] - Encrypting wrapper
pub trait KvStore: Send + Sync {
    /// Reads the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or a value cannot be decrypted.
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Writes `value` under `key`, replacing any existing value.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn put(&self, key: &str, value: &[u8]) -> StorageResult<()>;

    /// Writes `value` under `key` only if the key is absent.
    ///
    /// # Errors
    ///
    /// Returns a [`Unique`](crate::ConstraintKind::Unique) constraint error
    /// if the key already exists.
    fn insert(&self, key: &str, value: &[u8]) -> StorageResult<()>;

    /// Removes `key`. Returns `true` if a value was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn delete(&self, key: &str) -> StorageResult<bool>;

    /// Returns all rows whose key starts with `prefix`, in key order.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn scan_prefix(&self, prefix: &str) -> StorageResult<Vec<(String, Vec<u8>)>>;

    /// Flushes pending writes to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn flush(&self) -> StorageResult<()>;
}

impl<S: KvStore + ?Sized> KvStore for Arc<S> {
    fn get(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn put(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        (**self).put(key, value)
    }

    fn insert(&self, key: &str, value: &[u8]) -> StorageResult<()> {
        (**self).insert(key, value)
    }

    fn delete(&self, key: &str) -> StorageResult<bool> {
        (**self).delete(key)
    }

    fn scan_prefix(&self, prefix: &str) -> StorageResult<Vec<(String, Vec<u8>)>> {
        (**self).scan_prefix(prefix)
    }

    fn flush(&self) -> StorageResult<()> {
        (**self).flush()
    }
}
