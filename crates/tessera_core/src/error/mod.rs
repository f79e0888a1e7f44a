//! Failure taxonomy and the mapping from transport/storage errors.
//!
//! Every fallible operation in this crate returns [`CoreResult`]. Errors
//! raised at the boundaries ([`TransportError`] from the remote-call
//! interface, [`StorageError`](tessera_storage::StorageError) from local
//! stores) are converted into exactly one [`Failure`] variant by the
//! `From` impls in this module; nothing foreign leaks upward.

mod failure;
mod transport;

pub use failure::{ConflictCause, Failure, FailureDetail, FailureKind};
pub use transport::{classify_status, TransportError};

/// Result type for core operations.
pub type CoreResult<T> = Result<T, Failure>;
