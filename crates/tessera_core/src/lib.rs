//! # Tessera Core
//!
//! Data-access core for offline-capable applications.
//!
//! This crate provides:
//! - A closed [`Failure`] taxonomy and the mapping from transport and
//!   storage errors into it
//! - Combinators over [`CoreResult`] ([`ResultExt`], [`zip`], [`sequence`])
//! - [`PaginatedList`] snapshots and an infinite-scroll
//!   [`PaginationController`]
//! - Generic repositories over a remote backend and a local store
//! - A TTL/LRU [`cache`] tier with optional encryption at rest
//!
//! The write-queue sync engine lives in `tessera_sync` and builds on the
//! repositories defined here.
//!
//! ## Error handling
//!
//! Every fallible public operation returns [`CoreResult`]. Only
//! [`Failure::user_message`] is meant for end users; the rest of a
//! failure's detail is diagnostics.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod cache;
pub mod error;
pub mod pagination;
pub mod repository;
pub mod result;

pub use error::{
    classify_status, ConflictCause, CoreResult, Failure, FailureDetail, FailureKind,
    TransportError,
};
pub use pagination::{
    LoadOutcome, PageSource, PaginatedList, PaginationConfig, PaginationController,
    PaginationState, RepositoryPageSource,
};
pub use repository::{
    Entity, Filter, FnCodec, JsonCodec, LocalRepository, Method, PageQuery, RawResponse,
    RemoteCall, RemoteRepository, Repository, Sort, SortDirection, WireCodec,
};
pub use result::{sequence, traverse, zip, ResultExt};
