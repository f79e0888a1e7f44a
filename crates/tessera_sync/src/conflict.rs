//! Conflict policies for concurrent modifications.

use std::fmt;
use std::sync::Arc;
use tessera_core::{CoreResult, Entity, Failure};

/// How the engine settles a push rejected because the remote copy changed.
///
/// Uniqueness violations are never settled by a policy; the item fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// Keep the remote copy and drop the local change.
    #[default]
    ServerWins,
    /// Push the local copy over the remote one.
    ClientWins,
    /// Combine both copies with the engine's merger and push the result.
    Merge,
    /// Keep the remote copy and create the local content under a new id.
    KeepBoth,
}

/// An entity the sync engine can reconcile.
pub trait SyncEntity: Entity {
    /// Returns `self` carrying the remote copy's concurrency token, so a
    /// follow-up push is accepted.
    fn rebased_onto(&self, remote: &Self) -> Self;

    /// Returns a copy of `self` under a fresh identity, as if never pushed.
    fn with_new_identity(&self) -> Self;
}

/// Combines `(local, remote)` into one entity.
pub type Merger<E> = Arc<dyn Fn(&E, &E) -> E + Send + Sync>;

/// What to do after a conflict.
#[derive(Clone, PartialEq)]
pub enum Resolution<E> {
    /// Write the remote copy locally.
    KeepRemote(E),
    /// Push this entity as an update.
    Push(E),
    /// Create `copy` remotely and mirror both locally.
    Duplicate {
        /// Local content under a new identity.
        copy: E,
        /// The remote original.
        remote: E,
    },
}

impl<E> fmt::Debug for Resolution<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::KeepRemote(_) => f.write_str("KeepRemote"),
            Resolution::Push(_) => f.write_str("Push"),
            Resolution::Duplicate { .. } => f.write_str("Duplicate"),
        }
    }
}

/// Decides how to settle a conflict between `local` and `remote`.
///
/// The result depends only on the inputs and the merger.
///
/// # Errors
///
/// Returns [`Failure::Unexpected`] for [`ConflictPolicy::Merge`] without a
/// merger.
pub fn resolve<E: SyncEntity>(
    policy: ConflictPolicy,
    local: &E,
    remote: &E,
    merger: Option<&Merger<E>>,
) -> CoreResult<Resolution<E>> {
    match policy {
        ConflictPolicy::ServerWins => Ok(Resolution::KeepRemote(remote.clone())),
        ConflictPolicy::ClientWins => Ok(Resolution::Push(local.rebased_onto(remote))),
        ConflictPolicy::Merge => {
            let merger = merger.ok_or_else(|| {
                Failure::unexpected("merge policy configured without a merger")
                    .with_code("no_merger")
            })?;
            Ok(Resolution::Push((**merger)(local, remote).rebased_onto(remote)))
        }
        ConflictPolicy::KeepBoth => Ok(Resolution::Duplicate {
            copy: local.with_new_identity(),
            remote: remote.clone(),
        }),
    }
}
