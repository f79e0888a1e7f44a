//! Generic repositories.
//!
//! A [`Repository`] gives uniform CRUD and paged listing over one entity
//! type. Two implementations ship here:
//!
//! - [`RemoteRepository`] talks to the backend through a [`RemoteCall`]
//! - [`LocalRepository`] persists into a [`KvStore`](tessera_storage::KvStore)
//!   namespace and can stream snapshots with [`LocalRepository::watch_all`]
//!
//! Entities cross the wire through a [`WireCodec`] supplied at
//! construction, so the same entity type can be used against backends
//! with different wire shapes.

mod codec;
mod local;
mod query;
mod remote;

pub use codec::{FnCodec, JsonCodec, WireCodec};
pub use local::LocalRepository;
pub use query::{Filter, PageQuery, Sort, SortDirection, DEFAULT_PAGE_SIZE};
pub use remote::{Method, RawResponse, RemoteCall, RemoteRepository};

use crate::error::CoreResult;
use crate::pagination::PaginatedList;
use async_trait::async_trait;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

/// A persisted domain object with a stable identity.
pub trait Entity: Clone + Send + Sync + 'static {
    /// Identity type. Its `Display` form is used in storage keys and URLs.
    type Id: Clone + Eq + Hash + fmt::Display + fmt::Debug + Send + Sync + 'static;

    /// Returns this entity's identity.
    fn id(&self) -> Self::Id;
}

/// Uniform CRUD over one entity type.
///
/// Pages are 1-based. A page beyond the end is an empty list that still
/// reports the correct `total_items`.
#[async_trait]
pub trait Repository<E: Entity>: Send + Sync {
    /// Fetches one entity.
    ///
    /// # Errors
    ///
    /// Returns [`Failure::NotFound`](crate::Failure::NotFound) if no entity
    /// has this id.
    async fn get_by_id(&self, id: &E::Id) -> CoreResult<E>;

    /// Fetches one page.
    ///
    /// # Errors
    ///
    /// Returns the mapped failure of the underlying source.
    async fn get_all(&self, query: &PageQuery) -> CoreResult<PaginatedList<E>>;

    /// Creates an entity and returns the stored copy.
    ///
    /// # Errors
    ///
    /// Returns a conflict if the id is taken, or a validation failure if
    /// the entity is rejected.
    async fn create(&self, entity: &E) -> CoreResult<E>;

    /// Replaces an existing entity and returns the stored copy.
    ///
    /// # Errors
    ///
    /// Returns [`Failure::NotFound`](crate::Failure::NotFound) if the entity
    /// does not exist, or a conflict if it changed concurrently.
    async fn update(&self, entity: &E) -> CoreResult<E>;

    /// Deletes an entity.
    ///
    /// # Errors
    ///
    /// Returns [`Failure::NotFound`](crate::Failure::NotFound) if no entity
    /// has this id.
    async fn delete(&self, id: &E::Id) -> CoreResult<()>;
}

#[async_trait]
impl<E: Entity, R: Repository<E> + ?Sized> Repository<E> for Arc<R> {
    async fn get_by_id(&self, id: &E::Id) -> CoreResult<E> {
        (**self).get_by_id(id).await
    }

    async fn get_all(&self, query: &PageQuery) -> CoreResult<PaginatedList<E>> {
        (**self).get_all(query).await
    }

    async fn create(&self, entity: &E) -> CoreResult<E> {
        (**self).create(entity).await
    }

    async fn update(&self, entity: &E) -> CoreResult<E> {
        (**self).update(entity).await
    }

    async fn delete(&self, id: &E::Id) -> CoreResult<()> {
        (**self).delete(id).await
    }
}
