//! Durable queue of local changes waiting to be pushed.
//!
//! Records live in a [`KvStore`] under `sync_queue/<id>`, one per entity,
//! so the queue survives a restart when the store does. Repeated changes to
//! the same entity while it waits are coalesced into one record.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;
use tessera_core::{CoreResult, Failure, WireCodec};
use tessera_storage::KvStore;
use tracing::debug;

const PREFIX: &str = "sync_queue/";

/// The change a queue item carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOperation {
    /// The entity does not exist remotely yet.
    Create,
    /// The entity exists remotely and was edited.
    Update,
    /// The entity was removed locally.
    Delete,
}

/// Where a queue item is in its push lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Waiting for the next run.
    Pending,
    /// Being pushed by the current run.
    Syncing,
    /// Accepted by the remote. Removed on compaction.
    Synced,
    /// Rejected or not delivered. Retried by the next run.
    Failed,
}

impl SyncStatus {
    /// Returns true if the next run should push this item.
    pub fn is_pending(&self) -> bool {
        matches!(self, SyncStatus::Pending | SyncStatus::Failed)
    }
}

/// One queued change.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncQueueItem<E> {
    /// Entity id in its display form.
    pub id: String,
    /// Snapshot of the entity when the change was queued. For deletes, the
    /// last local copy.
    pub entity: E,
    /// The change to push.
    pub operation: SyncOperation,
    /// Lifecycle status.
    pub status: SyncStatus,
    /// Message of the last failed push.
    pub last_error: Option<String>,
    /// Enqueue order. Kept when later changes are coalesced in.
    pub seq: u64,
    /// Changes on every write to the record.
    pub revision: u64,
    /// Push attempts so far.
    pub attempts: u32,
}

#[derive(Serialize, Deserialize)]
struct Record {
    id: String,
    entity: Value,
    operation: SyncOperation,
    status: SyncStatus,
    last_error: Option<String>,
    seq: u64,
    revision: u64,
    attempts: u32,
}

/// Durable, coalescing queue of [`SyncQueueItem`]s.
pub struct SyncQueue<E, C> {
    store: Arc<dyn KvStore>,
    codec: C,
    // Next sequence/revision number. Held across read-modify-write.
    counter: Mutex<u64>,
    _entity: PhantomData<fn() -> E>,
}

impl<E, C: WireCodec<E>> SyncQueue<E, C> {
    /// Opens the queue stored in `store`.
    ///
    /// # Errors
    ///
    /// Returns a cache failure if existing records cannot be read.
    pub fn open(store: Arc<dyn KvStore>, codec: C) -> CoreResult<Self> {
        let mut next = 1;
        for (key, bytes) in store.scan_prefix(PREFIX)? {
            let record = decode_record(&key, &bytes)?;
            next = next.max(record.seq + 1).max(record.revision + 1);
        }
        Ok(Self {
            store,
            codec,
            counter: Mutex::new(next),
            _entity: PhantomData,
        })
    }

    fn key(id: &str) -> String {
        format!("{PREFIX}{id}")
    }

    fn read(&self, id: &str) -> CoreResult<Option<Record>> {
        let key = Self::key(id);
        self.store
            .get(&key)?
            .map(|bytes| decode_record(&key, &bytes))
            .transpose()
    }

    fn write(&self, record: &Record) -> CoreResult<()> {
        let bytes = serde_json::to_vec(record).map_err(|e| Failure::cache(e.to_string()))?;
        self.store.put(&Self::key(&record.id), &bytes)?;
        Ok(())
    }

    fn to_item(&self, record: Record) -> CoreResult<SyncQueueItem<E>> {
        Ok(SyncQueueItem {
            entity: self.codec.decode(record.entity)?,
            id: record.id,
            operation: record.operation,
            status: record.status,
            last_error: record.last_error,
            seq: record.seq,
            revision: record.revision,
            attempts: record.attempts,
        })
    }

    /// Queues `operation` on `entity`, coalescing with a waiting record.
    ///
    /// Returns the stored item, or `None` if the change cancelled out a
    /// create that never reached the remote.
    ///
    /// # Errors
    ///
    /// Returns a cache failure if the store cannot be written.
    pub fn enqueue(
        &self,
        id: impl Into<String>,
        entity: &E,
        operation: SyncOperation,
    ) -> CoreResult<Option<SyncQueueItem<E>>> {
        let id = id.into();
        let mut counter = self.counter.lock();
        let snapshot = self.codec.encode(entity)?;

        let existing = self.read(&id)?.filter(|r| r.status != SyncStatus::Synced);
        let (operation, seq, attempts) = match existing {
            // The in-flight push may still fail, so the new record must stand
            // on its own. `rebase_after_push` adjusts it if the push lands.
            Some(old) if old.status == SyncStatus::Syncing => (
                coalesce(old.operation, operation).unwrap_or(SyncOperation::Delete),
                old.seq,
                old.attempts,
            ),
            Some(old) => match coalesce(old.operation, operation) {
                Some(merged) => (merged, old.seq, old.attempts),
                None => {
                    self.store.delete(&Self::key(&id))?;
                    debug!(%id, "queued create cancelled by delete");
                    return Ok(None);
                }
            },
            None => {
                let seq = *counter;
                *counter += 1;
                (operation, seq, 0)
            }
        };

        let record = Record {
            id,
            entity: snapshot,
            operation,
            status: SyncStatus::Pending,
            last_error: None,
            seq,
            revision: *counter,
            attempts,
        };
        *counter += 1;
        self.write(&record)?;
        debug!(id = %record.id, ?operation, seq, "queued change");
        self.to_item(record).map(Some)
    }

    /// Looks up one item.
    ///
    /// # Errors
    ///
    /// Returns a cache failure if the record cannot be read.
    pub fn get(&self, id: &str) -> CoreResult<Option<SyncQueueItem<E>>> {
        self.read(id)?.map(|r| self.to_item(r)).transpose()
    }

    /// Every item in enqueue order.
    ///
    /// # Errors
    ///
    /// Returns a cache failure if a record cannot be read.
    pub fn items(&self) -> CoreResult<Vec<SyncQueueItem<E>>> {
        let mut records = self.records()?;
        records.sort_by_key(|r| r.seq);
        records.into_iter().map(|r| self.to_item(r)).collect()
    }

    /// Pending and failed items in enqueue order.
    ///
    /// # Errors
    ///
    /// Returns a cache failure if a record cannot be read.
    pub fn pending(&self) -> CoreResult<Vec<SyncQueueItem<E>>> {
        Ok(self
            .items()?
            .into_iter()
            .filter(|item| item.status.is_pending())
            .collect())
    }

    /// Number of pending and failed items.
    ///
    /// # Errors
    ///
    /// Returns a cache failure if a record cannot be read.
    pub fn pending_count(&self) -> CoreResult<usize> {
        Ok(self
            .records()?
            .iter()
            .filter(|r| r.status.is_pending())
            .count())
    }

    fn records(&self) -> CoreResult<Vec<Record>> {
        self.store
            .scan_prefix(PREFIX)?
            .iter()
            .map(|(key, bytes)| decode_record(key, bytes))
            .collect()
    }

    fn transition(
        &self,
        id: &str,
        revision: u64,
        apply: impl FnOnce(&mut Record),
    ) -> CoreResult<bool> {
        let _counter = self.counter.lock();
        match self.read(id)? {
            Some(mut record) if record.revision == revision => {
                apply(&mut record);
                self.write(&record)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Marks an item as being pushed and counts the attempt.
    ///
    /// Returns `false` without changes if the item was rewritten since
    /// `revision` was read.
    ///
    /// # Errors
    ///
    /// Returns a cache failure if the store cannot be written.
    pub fn mark_syncing(&self, id: &str, revision: u64) -> CoreResult<bool> {
        self.transition(id, revision, |r| {
            r.status = SyncStatus::Syncing;
            r.attempts += 1;
        })
    }

    /// Marks an item as accepted by the remote.
    ///
    /// Returns `false` without changes if the item was rewritten since
    /// `revision` was read; the newer change stays queued.
    ///
    /// # Errors
    ///
    /// Returns a cache failure if the store cannot be written.
    pub fn mark_synced(&self, id: &str, revision: u64) -> CoreResult<bool> {
        self.transition(id, revision, |r| {
            r.status = SyncStatus::Synced;
            r.last_error = None;
        })
    }

    /// Marks an item as failed with `message`.
    ///
    /// # Errors
    ///
    /// Returns a cache failure if the store cannot be written.
    pub fn mark_failed(&self, id: &str, revision: u64, message: &str) -> CoreResult<bool> {
        self.transition(id, revision, |r| {
            r.status = SyncStatus::Failed;
            r.last_error = Some(message.to_string());
        })
    }

    /// Adjusts the change waiting for `id` after an earlier push of
    /// `pushed` landed while it was queued.
    ///
    /// A waiting create becomes an update once the create landed, and a
    /// waiting update becomes a create once a delete landed. `rebase` maps
    /// the waiting snapshot onto the pushed copy. Returns `false` if
    /// nothing waits for `id`.
    ///
    /// # Errors
    ///
    /// Returns a cache failure if the store cannot be written.
    pub fn rebase_after_push(
        &self,
        id: &str,
        pushed: SyncOperation,
        rebase: impl FnOnce(E) -> E,
    ) -> CoreResult<bool> {
        use SyncOperation::{Create, Delete, Update};
        let mut counter = self.counter.lock();
        let Some(mut record) = self.read(id)?.filter(|r| r.status.is_pending()) else {
            return Ok(false);
        };
        record.operation = match (pushed, record.operation) {
            (Create, Create) => Update,
            (Delete, Update) => Create,
            (_, waiting) => waiting,
        };
        let entity = rebase(self.codec.decode(record.entity)?);
        record.entity = self.codec.encode(&entity)?;
        record.revision = *counter;
        *counter += 1;
        self.write(&record)?;
        debug!(%id, operation = ?record.operation, "rebased queued change after push");
        Ok(true)
    }

    /// Resets items left `Syncing` by an interrupted run to `Pending`.
    ///
    /// # Errors
    ///
    /// Returns a cache failure if the store cannot be written.
    pub fn recover_interrupted(&self) -> CoreResult<usize> {
        let _counter = self.counter.lock();
        let mut recovered = 0;
        for mut record in self.records()? {
            if record.status == SyncStatus::Syncing {
                record.status = SyncStatus::Pending;
                self.write(&record)?;
                recovered += 1;
            }
        }
        Ok(recovered)
    }

    /// Deletes synced items. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns a cache failure if the store cannot be written.
    pub fn compact(&self) -> CoreResult<usize> {
        let _counter = self.counter.lock();
        let mut removed = 0;
        for record in self.records()? {
            if record.status == SyncStatus::Synced && self.store.delete(&Self::key(&record.id))? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Drops an item regardless of status. Returns `true` if it existed.
    ///
    /// # Errors
    ///
    /// Returns a cache failure if the store cannot be written.
    pub fn discard(&self, id: &str) -> CoreResult<bool> {
        let _counter = self.counter.lock();
        Ok(self.store.delete(&Self::key(id))?)
    }
}

/// Folds a new change into a waiting one. `None` means nothing is left
/// to push.
fn coalesce(queued: SyncOperation, next: SyncOperation) -> Option<SyncOperation> {
    use SyncOperation::{Create, Delete, Update};
    match (queued, next) {
        (Create, Delete) => None,
        (Create, _) => Some(Create),
        (Delete, Create) | (Update, Create) => Some(Update),
        (_, next) => Some(next),
    }
}

fn decode_record(key: &str, bytes: &[u8]) -> CoreResult<Record> {
    serde_json::from_slice(bytes)
        .map_err(|e| Failure::cache(format!("unreadable queue record {key}: {e}")))
}
