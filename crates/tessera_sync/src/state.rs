//! Engine state, statistics and run results.

use std::time::SystemTime;
use tessera_core::Failure;

/// The current state of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
    /// No run has happened yet.
    #[default]
    Idle,
    /// A run is pushing queued items.
    Syncing,
    /// The last run pushed every item.
    Synced,
    /// The last run left failed items or could not start.
    Error,
}

impl SyncState {
    /// Returns true while a run is in progress.
    pub fn is_active(&self) -> bool {
        matches!(self, SyncState::Syncing)
    }

    /// Returns true if a new run would start without waiting.
    pub fn can_start_sync(&self) -> bool {
        !self.is_active()
    }
}

/// Cumulative statistics across runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncStats {
    /// Runs completed.
    pub runs: u64,
    /// Items the remote accepted.
    pub items_pushed: u64,
    /// Items left failed at the end of a run.
    pub items_failed: u64,
    /// Concurrent-modification conflicts settled by the policy.
    pub conflicts_resolved: u64,
    /// Extra runs started by `sync_with_retry`.
    pub retries: u64,
    /// Wall-clock time the last run finished.
    pub last_run_at: Option<SystemTime>,
    /// Message of the most recent item failure.
    pub last_error: Option<String>,
}

/// An item that failed during a run.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncItemError {
    /// Queue id of the item.
    pub id: String,
    /// Why the push failed.
    pub failure: Failure,
}

/// Outcome of one [`sync_all`](crate::SyncEngine::sync_all) run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncResult {
    /// Items attempted.
    pub total_items: usize,
    /// Items now synced.
    pub synced_items: usize,
    /// Items now failed.
    pub failed_items: usize,
    /// One entry per failed item, in push order.
    pub errors: Vec<SyncItemError>,
}

impl SyncResult {
    /// Returns true if every attempted item synced.
    pub fn is_success(&self) -> bool {
        self.failed_items == 0
    }

    /// Returns true if the run failed only with retryable failures.
    pub fn is_retryable(&self) -> bool {
        !self.errors.is_empty() && self.errors.iter().all(|e| e.failure.is_retryable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_syncing_is_active() {
        assert!(SyncState::Syncing.is_active());
        assert!(!SyncState::Syncing.can_start_sync());
        for state in [SyncState::Idle, SyncState::Synced, SyncState::Error] {
            assert!(state.can_start_sync());
        }
    }

    #[test]
    fn result_retryability() {
        let mut result = SyncResult {
            total_items: 2,
            synced_items: 0,
            failed_items: 2,
            errors: vec![
                SyncItemError {
                    id: "a".into(),
                    failure: Failure::network("offline"),
                },
                SyncItemError {
                    id: "b".into(),
                    failure: Failure::timeout("slow"),
                },
            ],
        };
        assert!(result.is_retryable());

        result.errors.push(SyncItemError {
            id: "c".into(),
            failure: Failure::validation("bad"),
        });
        assert!(!result.is_retryable());
        assert!(!SyncResult::default().is_retryable());
        assert!(SyncResult::default().is_success());
    }
}
