//! # Tessera Sync
//!
//! Offline write queue and sync engine for Tessera repositories.
//!
//! Local changes are applied to a [`LocalRepository`](tessera_core::LocalRepository)
//! immediately and recorded in a durable [`SyncQueue`]. A [`SyncEngine`]
//! later pushes the queue to a remote [`Repository`](tessera_core::Repository)
//! in enqueue order.
//!
//! ## Conflicts
//!
//! When the remote rejects an update because its copy changed, the
//! engine's [`ConflictPolicy`] decides the outcome:
//!
//! - `ServerWins`: the remote copy replaces the local one
//! - `ClientWins`: the local copy is pushed again over the remote one
//! - `Merge`: a caller-supplied merger combines both
//! - `KeepBoth`: the local content is created under a new identity
//!
//! Uniqueness violations are never resolved automatically.
//!
//! ## Example
//!
//! ```rust,ignore
//! let engine = SyncEngine::new(remote, local, SyncConfig::default())?
//!     .with_policy(ConflictPolicy::ClientWins);
//! engine.save(&note)?;
//! let result = engine.sync_all().await?;
//! assert!(result.is_success());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod conflict;
mod engine;
mod queue;
mod state;

pub use config::{RetryConfig, SyncConfig};
pub use conflict::{resolve, ConflictPolicy, Merger, Resolution, SyncEntity};
pub use engine::SyncEngine;
pub use queue::{SyncOperation, SyncQueue, SyncQueueItem, SyncStatus};
pub use state::{SyncItemError, SyncResult, SyncState, SyncStats};
