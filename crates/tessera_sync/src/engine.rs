//! The sync engine.

use crate::config::SyncConfig;
use crate::conflict::{resolve, ConflictPolicy, Merger, Resolution, SyncEntity};
use crate::queue::{SyncOperation, SyncQueue, SyncQueueItem};
use crate::state::{SyncItemError, SyncResult, SyncState, SyncStats};
use parking_lot::RwLock;
use std::future::Future;
use std::sync::Arc;
use std::time::SystemTime;
use tessera_core::{
    ConflictCause, CoreResult, Failure, FailureKind, LocalRepository, Repository, WireCodec,
};
use tracing::{debug, info, warn};

/// Pushes local changes to a remote repository.
///
/// Local writes go through [`save`](Self::save) and
/// [`remove`](Self::remove), which update the local repository at once
/// and queue the change. [`sync_all`](Self::sync_all) later pushes the
/// queue in enqueue order. Runs never interleave: a second call waits for
/// the first to finish.
pub struct SyncEngine<E: SyncEntity, C> {
    remote: Arc<dyn Repository<E>>,
    local: LocalRepository<E, C>,
    queue: SyncQueue<E, C>,
    config: SyncConfig,
    policy: ConflictPolicy,
    merger: Option<Merger<E>>,
    run_lock: tokio::sync::Mutex<()>,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
}

impl<E: SyncEntity, C: WireCodec<E> + Clone> SyncEngine<E, C> {
    /// Creates an engine over `local`, whose store also holds the queue.
    ///
    /// # Errors
    ///
    /// Returns a cache failure if the stored queue cannot be read.
    pub fn new(
        remote: Arc<dyn Repository<E>>,
        local: LocalRepository<E, C>,
        config: SyncConfig,
    ) -> CoreResult<Self> {
        let queue = SyncQueue::open(Arc::clone(local.store()), local.codec().clone())?;
        Ok(Self {
            remote,
            local,
            queue,
            config,
            policy: ConflictPolicy::default(),
            merger: None,
            run_lock: tokio::sync::Mutex::new(()),
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
        })
    }

    /// Sets the conflict policy.
    #[must_use]
    pub fn with_policy(mut self, policy: ConflictPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the merger used by [`ConflictPolicy::Merge`].
    #[must_use]
    pub fn with_merger(mut self, merger: impl Fn(&E, &E) -> E + Send + Sync + 'static) -> Self {
        self.merger = Some(Arc::new(merger));
        self
    }

    /// The conflict policy.
    pub fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    /// The configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// The local repository.
    pub fn local(&self) -> &LocalRepository<E, C> {
        &self.local
    }

    /// The queue.
    pub fn queue(&self) -> &SyncQueue<E, C> {
        &self.queue
    }

    /// Current engine state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Statistics across runs.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Writes `entity` locally and queues it for the remote.
    ///
    /// Entities already stored locally are queued as updates, others as
    /// creates.
    ///
    /// # Errors
    ///
    /// Returns the local repository's failure, e.g. a validation failure
    /// for a missing required field.
    pub fn save(&self, entity: &E) -> CoreResult<()> {
        let id = entity.id();
        let operation = if self.local.find(&id)?.is_some() {
            SyncOperation::Update
        } else {
            SyncOperation::Create
        };
        self.local.upsert(entity)?;
        self.queue.enqueue(id.to_string(), entity, operation)?;
        Ok(())
    }

    /// Removes an entity locally and queues the delete.
    ///
    /// # Errors
    ///
    /// Returns [`Failure::NotFound`] if the entity is not stored locally.
    pub fn remove(&self, id: &E::Id) -> CoreResult<()> {
        let Some(existing) = self.local.find(id)? else {
            return Err(Failure::not_found("").with_context("id", id.to_string()));
        };
        self.local.remove(id)?;
        self.queue
            .enqueue(id.to_string(), &existing, SyncOperation::Delete)?;
        Ok(())
    }

    /// Number of items the next run would push.
    ///
    /// # Errors
    ///
    /// Returns a cache failure if the queue cannot be read.
    pub fn pending_count(&self) -> CoreResult<usize> {
        self.queue.pending_count()
    }

    /// Drops synced items from the queue.
    ///
    /// # Errors
    ///
    /// Returns a cache failure if the queue cannot be written.
    pub fn compact(&self) -> CoreResult<usize> {
        self.queue.compact()
    }

    /// Drops the queued change for `id` without pushing it. The local copy
    /// is left as it is.
    ///
    /// # Errors
    ///
    /// Returns a cache failure if the queue cannot be written.
    pub fn discard(&self, id: &E::Id) -> CoreResult<bool> {
        self.queue.discard(&id.to_string())
    }

    /// Pushes every pending and failed item once, in enqueue order.
    ///
    /// A failed item does not stop the run; it is marked failed and
    /// reported in [`SyncResult::errors`].
    ///
    /// # Errors
    ///
    /// Returns a cache failure if the queue or local store cannot be used.
    /// Remote failures are reported per item instead.
    pub async fn sync_all(&self) -> CoreResult<SyncResult> {
        let _run = self.run_lock.lock().await;
        let run = RunGuard::begin(&self.state);

        let recovered = self.queue.recover_interrupted()?;
        if recovered > 0 {
            warn!(recovered, "reset items left syncing by an interrupted run");
        }
        if self.config.auto_compact {
            let removed = self.queue.compact()?;
            debug!(removed, "compacted sync queue");
        }

        let items = self.queue.pending()?;
        info!(items = items.len(), policy = ?self.policy, "sync run started");

        let mut result = SyncResult::default();
        for item in items {
            if !self.queue.mark_syncing(&item.id, item.revision)? {
                debug!(id = %item.id, "item changed before push, skipping");
                continue;
            }
            result.total_items += 1;

            match self.push(&item).await {
                Ok(()) => result.synced_items += 1,
                Err(failure) => {
                    warn!(
                        id = %item.id,
                        operation = ?item.operation,
                        kind = ?failure.kind(),
                        error = %failure,
                        "push failed"
                    );
                    self.queue
                        .mark_failed(&item.id, item.revision, &failure.to_string())?;
                    result.failed_items += 1;
                    result.errors.push(SyncItemError {
                        id: item.id,
                        failure,
                    });
                }
            }
        }

        {
            let mut stats = self.stats.write();
            stats.runs += 1;
            stats.items_pushed += result.synced_items as u64;
            stats.items_failed += result.failed_items as u64;
            stats.last_run_at = Some(SystemTime::now());
            if let Some(last) = result.errors.last() {
                stats.last_error = Some(last.failure.to_string());
            }
        }

        info!(
            total = result.total_items,
            synced = result.synced_items,
            failed = result.failed_items,
            "sync run finished"
        );
        run.finish(if result.is_success() {
            SyncState::Synced
        } else {
            SyncState::Error
        });
        Ok(result)
    }

    /// Runs [`sync_all`](Self::sync_all) until it succeeds, fails with a
    /// failure that is not retryable, or the configured attempts run out.
    ///
    /// # Errors
    ///
    /// Returns the last run's error.
    pub async fn sync_with_retry(&self) -> CoreResult<SyncResult> {
        let retry = &self.config.retry;
        let mut attempt = 0;
        loop {
            let delay = retry.delay_for_attempt(attempt);
            if attempt > 0 {
                self.stats.write().retries += 1;
                info!(attempt, ?delay, "retrying sync run");
                tokio::time::sleep(delay).await;
            }

            let outcome = self.sync_all().await;
            attempt += 1;
            let retryable = match &outcome {
                Ok(result) => result.is_retryable(),
                Err(failure) => failure.is_retryable(),
            };
            if !retryable || attempt >= retry.max_attempts {
                return outcome;
            }
        }
    }

    async fn push(&self, item: &SyncQueueItem<E>) -> CoreResult<()> {
        debug!(id = %item.id, operation = ?item.operation, attempt = item.attempts + 1, "pushing");
        match item.operation {
            SyncOperation::Create => {
                let stored = self.bounded(self.remote.create(&item.entity)).await?;
                self.settle(item, &[stored])
            }
            SyncOperation::Update => match self.bounded(self.remote.update(&item.entity)).await {
                Ok(stored) => self.settle(item, &[stored]),
                Err(failure)
                    if failure.conflict_cause() == Some(ConflictCause::ConcurrentModification) =>
                {
                    self.resolve_conflict(item).await
                }
                Err(failure) => Err(failure),
            },
            SyncOperation::Delete => {
                let id = item.entity.id();
                match self.bounded(self.remote.delete(&id)).await {
                    Ok(()) => self.settle(item, &[]),
                    Err(failure) if failure.kind() == FailureKind::NotFound => {
                        debug!(id = %item.id, "already deleted remotely");
                        self.settle(item, &[])
                    }
                    Err(failure) => Err(failure),
                }
            }
        }
    }

    async fn resolve_conflict(&self, item: &SyncQueueItem<E>) -> CoreResult<()> {
        let remote = self
            .bounded(self.remote.get_by_id(&item.entity.id()))
            .await?;
        let resolution = resolve(self.policy, &item.entity, &remote, self.merger.as_ref())?;
        info!(id = %item.id, policy = ?self.policy, ?resolution, "resolving conflict");

        match resolution {
            Resolution::KeepRemote(remote) => self.settle(item, &[remote])?,
            Resolution::Push(entity) => {
                let stored = self.bounded(self.remote.update(&entity)).await?;
                self.settle(item, &[stored])?;
            }
            Resolution::Duplicate { copy, remote } => {
                let created = self.bounded(self.remote.create(&copy)).await?;
                self.settle(item, &[remote, created])?;
            }
        }
        self.stats.write().conflicts_resolved += 1;
        Ok(())
    }

    /// Marks `item` synced and mirrors the remote copies locally. If a newer
    /// local change was queued while the push was in flight, that change is
    /// rebased onto the pushed copy instead.
    fn settle(&self, item: &SyncQueueItem<E>, stored: &[E]) -> CoreResult<()> {
        if !self.queue.mark_synced(&item.id, item.revision)? {
            debug!(id = %item.id, "newer change queued during push");
            self.queue
                .rebase_after_push(&item.id, item.operation, |waiting| match stored.first() {
                    Some(copy) => waiting.rebased_onto(copy),
                    None => waiting,
                })?;
            return Ok(());
        }
        for entity in stored {
            self.local.upsert(entity)?;
        }
        Ok(())
    }

    async fn bounded<T>(&self, call: impl Future<Output = CoreResult<T>>) -> CoreResult<T> {
        let limit = self.config.push_timeout;
        match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(Failure::timeout(format!("push exceeded {limit:?}")).with_code("push_timeout")),
        }
    }
}

/// Sets the engine state for one run. A run dropped before finishing
/// leaves the state as [`SyncState::Error`].
struct RunGuard<'a> {
    state: &'a RwLock<SyncState>,
    finished: bool,
}

impl<'a> RunGuard<'a> {
    fn begin(state: &'a RwLock<SyncState>) -> Self {
        *state.write() = SyncState::Syncing;
        Self {
            state,
            finished: false,
        }
    }

    fn finish(mut self, outcome: SyncState) {
        *self.state.write() = outcome;
        self.finished = true;
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            *self.state.write() = SyncState::Error;
        }
    }
}
