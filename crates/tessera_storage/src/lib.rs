//! # Tessera Storage
//!
//! Local key/value store interface and backends for Tessera.
//!
//! This crate is the lowest layer of the offline core. The cache tier,
//! the local repository and the sync queue all persist through the
//! [`KvStore`] trait and never touch files or ciphers directly.
//!
//! ## Design Principles
//!
//! - Stores map string keys to opaque byte values
//! - Keys are ordered, so prefix scans return rows in key order
//! - Stores use interior mutability and must be `Send + Sync`
//! - Constraint violations are reported as typed errors, not panics
//!
//! ## Available Backends
//!
//! - [`InMemoryStore`] - For testing and ephemeral data
//! - [`FileStore`] - Append-only log file that survives restarts
//! - [`EncryptedStore`] - Wrapper that adds AES-256-GCM to selected keyspaces
//!
//! ## Example
//!
//! ```rust
//! use tessera_storage::{InMemoryStore, KvStore};
//!
//! let store = InMemoryStore::new();
//! store.put("notes/1", b"hello").unwrap();
//! assert_eq!(store.get("notes/1").unwrap().as_deref(), Some(&b"hello"[..]));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod encrypted;
mod error;
mod file;
mod memory;
mod store;

pub use encrypted::{EncryptedStore, EncryptionKey, Keyspaces, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
pub use error::{ConstraintKind, StorageError, StorageResult};
pub use file::FileStore;
pub use memory::InMemoryStore;
pub use store::KvStore;
