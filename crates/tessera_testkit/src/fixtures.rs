//! Fixture entity and store helpers.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tempfile::TempDir;
use tessera_core::{Entity, JsonCodec};
use tessera_storage::{FileStore, InMemoryStore, KvStore};
use tessera_sync::SyncEntity;
use uuid::Uuid;

/// A small versioned entity used across the test suites.
///
/// `version` is the optimistic-concurrency token the
/// [`FakeBackend`](crate::FakeBackend) checks on update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Identity.
    pub id: Uuid,
    /// Title.
    pub title: String,
    /// Body text.
    pub body: String,
    /// Optional folder, used by filter tests.
    pub folder: Option<String>,
    /// Concurrency token. 0 until the backend has stored the note.
    pub version: u64,
}

impl Note {
    /// Creates an unsaved note.
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            body: body.into(),
            folder: None,
            version: 0,
        }
    }

    /// Sets the folder.
    #[must_use]
    pub fn in_folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = Some(folder.into());
        self
    }

    /// Returns a copy with a different body.
    #[must_use]
    pub fn edited(&self, body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..self.clone()
        }
    }
}

impl Entity for Note {
    type Id = Uuid;

    fn id(&self) -> Uuid {
        self.id
    }
}

impl SyncEntity for Note {
    fn rebased_onto(&self, remote: &Self) -> Self {
        Self {
            version: remote.version,
            ..self.clone()
        }
    }

    fn with_new_identity(&self) -> Self {
        Self {
            id: Uuid::new_v4(),
            version: 0,
            ..self.clone()
        }
    }
}

/// Codec for [`Note`].
pub fn note_codec() -> JsonCodec<Note> {
    JsonCodec::new()
}

/// A fresh in-memory store.
pub fn memory_store() -> Arc<dyn KvStore> {
    Arc::new(InMemoryStore::new())
}

/// A file-backed store in a temporary directory.
///
/// Keep the returned directory alive for as long as the store is used.
pub fn temp_file_store() -> (Arc<FileStore>, TempDir) {
    let dir = TempDir::new().expect("Failed to create temp directory");
    let store = FileStore::open(&dir.path().join("tessera.log")).expect("Failed to open store");
    (Arc::new(store), dir)
}

/// Reopens the store file created by [`temp_file_store`].
pub fn reopen_file_store(dir: &TempDir) -> Arc<FileStore> {
    Arc::new(FileStore::open(&dir.path().join("tessera.log")).expect("Failed to reopen store"))
}
