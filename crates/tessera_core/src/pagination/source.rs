//! Where the pagination controller gets its pages from.

use super::PaginatedList;
use crate::error::CoreResult;
use crate::repository::{Entity, PageQuery, Repository};
use async_trait::async_trait;
use std::marker::PhantomData;
use std::sync::Arc;

/// Supplies numbered pages.
#[async_trait]
pub trait PageSource<T>: Send + Sync {
    /// Fetches page `page` (1-based) of `page_size` items.
    ///
    /// # Errors
    ///
    /// Returns the failure of the underlying source.
    async fn fetch(&self, page: u32, page_size: u32) -> CoreResult<PaginatedList<T>>;
}

#[async_trait]
impl<T, S: PageSource<T> + ?Sized> PageSource<T> for Arc<S> {
    async fn fetch(&self, page: u32, page_size: u32) -> CoreResult<PaginatedList<T>> {
        (**self).fetch(page, page_size).await
    }
}

/// Pages a [`Repository`] with a fixed filter and sort order.
pub struct RepositoryPageSource<E, R> {
    repository: R,
    query: PageQuery,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity, R: Repository<E>> RepositoryPageSource<E, R> {
    /// Pages `repository` using the filter and sort of `query`.
    ///
    /// The page number and size of `query` are ignored; the controller
    /// supplies them per fetch.
    pub fn new(repository: R, query: PageQuery) -> Self {
        Self {
            repository,
            query,
            _entity: PhantomData,
        }
    }
}

#[async_trait]
impl<E: Entity, R: Repository<E>> PageSource<E> for RepositoryPageSource<E, R> {
    async fn fetch(&self, page: u32, page_size: u32) -> CoreResult<PaginatedList<E>> {
        let mut query = self.query.with_page(page);
        query.page_size = page_size.max(1);
        self.repository.get_all(&query).await
    }
}
