//! Repository over a local key/value store namespace.

use super::{Entity, PageQuery, Repository, WireCodec};
use crate::error::{CoreResult, Failure};
use crate::pagination::PaginatedList;
use async_trait::async_trait;
use futures::{Stream, StreamExt};
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;
use tessera_storage::{ConstraintKind, KvStore, StorageError};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::debug;

struct Inner<E, C> {
    store: Arc<dyn KvStore>,
    prefix: String,
    codec: C,
    required: Vec<String>,
    revision: watch::Sender<u64>,
    _entity: PhantomData<fn() -> E>,
}

/// A [`Repository`] persisted in a [`KvStore`] under `<namespace>/<id>`.
///
/// Writes are visible immediately and bump a revision that drives
/// [`watch_all`](Self::watch_all). Cloning is cheap and clones share the
/// same namespace and watchers.
pub struct LocalRepository<E, C> {
    inner: Arc<Inner<E, C>>,
}

impl<E, C> Clone for LocalRepository<E, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: Entity, C: WireCodec<E>> LocalRepository<E, C> {
    /// Creates a repository over `namespace` in `store`.
    pub fn new(store: Arc<dyn KvStore>, namespace: &str, codec: C) -> Self {
        Self::build(store, namespace, codec, Vec::new())
    }

    /// Creates a repository that rejects writes missing any of `fields`
    /// (absent or `null` in the wire representation).
    pub fn with_required_fields<I, S>(
        store: Arc<dyn KvStore>,
        namespace: &str,
        codec: C,
        fields: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::build(
            store,
            namespace,
            codec,
            fields.into_iter().map(Into::into).collect(),
        )
    }

    fn build(store: Arc<dyn KvStore>, namespace: &str, codec: C, required: Vec<String>) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                store,
                prefix: format!("{}/", namespace.trim_end_matches('/')),
                codec,
                required,
                revision,
                _entity: PhantomData,
            }),
        }
    }

    /// The codec used for stored rows.
    pub fn codec(&self) -> &C {
        &self.inner.codec
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.inner.store
    }

    fn key(&self, id: &E::Id) -> String {
        format!("{}{}", self.inner.prefix, id)
    }

    fn encode_row(&self, entity: &E) -> CoreResult<Vec<u8>> {
        let wire = self.inner.codec.encode(entity)?;
        for field in &self.inner.required {
            if wire.get(field).map_or(true, Value::is_null) {
                return Err(StorageError::constraint(
                    ConstraintKind::NotNull,
                    field.as_str(),
                    format!("{field} is required"),
                )
                .into());
            }
        }
        serde_json::to_vec(&wire).map_err(|e| Failure::unexpected(e.to_string()))
    }

    fn decode_wire(&self, key: &str, bytes: &[u8]) -> CoreResult<Value> {
        serde_json::from_slice(bytes)
            .map_err(|e| Failure::cache(format!("unreadable row {key}: {e}")))
    }

    fn rows(&self) -> CoreResult<Vec<Value>> {
        self.inner
            .store
            .scan_prefix(&self.inner.prefix)?
            .iter()
            .map(|(key, bytes)| self.decode_wire(key, bytes))
            .collect()
    }

    fn touch(&self) {
        self.inner.revision.send_modify(|rev| *rev += 1);
    }

    /// Looks up one entity.
    ///
    /// # Errors
    ///
    /// Returns a cache failure if the store cannot be read.
    pub fn find(&self, id: &E::Id) -> CoreResult<Option<E>> {
        let key = self.key(id);
        match self.inner.store.get(&key)? {
            Some(bytes) => {
                let wire = self.decode_wire(&key, &bytes)?;
                self.inner.codec.decode(wire).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Returns every entity in key order.
    ///
    /// # Errors
    ///
    /// Returns a cache failure if the store cannot be read.
    pub fn all(&self) -> CoreResult<Vec<E>> {
        self.rows()?
            .into_iter()
            .map(|wire| self.inner.codec.decode(wire))
            .collect()
    }

    /// Number of stored entities.
    ///
    /// # Errors
    ///
    /// Returns a cache failure if the store cannot be read.
    pub fn count(&self) -> CoreResult<usize> {
        Ok(self.inner.store.scan_prefix(&self.inner.prefix)?.len())
    }

    /// Inserts or replaces an entity.
    ///
    /// # Errors
    ///
    /// Returns a validation failure if a required field is missing.
    pub fn upsert(&self, entity: &E) -> CoreResult<()> {
        let row = self.encode_row(entity)?;
        self.inner.store.put(&self.key(&entity.id()), &row)?;
        debug!(key = %self.key(&entity.id()), "local upsert");
        self.touch();
        Ok(())
    }

    /// Removes an entity. Returns `true` if it existed.
    ///
    /// # Errors
    ///
    /// Returns a cache failure if the store cannot be written.
    pub fn remove(&self, id: &E::Id) -> CoreResult<bool> {
        let removed = self.inner.store.delete(&self.key(id))?;
        if removed {
            debug!(key = %self.key(id), "local remove");
            self.touch();
        }
        Ok(removed)
    }

    /// Streams full snapshots of the namespace.
    ///
    /// The stream yields the current contents immediately and a fresh
    /// snapshot after every local mutation. Snapshots taken while several
    /// writes land at once may skip intermediate states. Each call returns
    /// an independent stream that never ends on its own; drop it to
    /// unsubscribe.
    pub fn watch_all(&self) -> impl Stream<Item = CoreResult<Vec<E>>> + Send + 'static
    where
        C: 'static,
    {
        let repo = self.clone();
        WatchStream::new(self.inner.revision.subscribe()).map(move |_| repo.all())
    }

    fn page(&self, query: &PageQuery) -> CoreResult<PaginatedList<E>> {
        let mut rows = self.rows()?;
        if let Some(filter) = &query.filter {
            rows.retain(|row| filter.matches(row));
        }
        if let Some(sort) = &query.sort {
            rows.sort_by(|a, b| sort.compare(a, b));
        }
        PaginatedList::from_slice(&rows, query.page, query.page_size)
            .try_map(|wire| self.inner.codec.decode(wire))
    }
}

#[async_trait]
impl<E: Entity, C: WireCodec<E>> Repository<E> for LocalRepository<E, C> {
    async fn get_by_id(&self, id: &E::Id) -> CoreResult<E> {
        self.find(id)?
            .ok_or_else(|| Failure::not_found("").with_context("key", self.key(id)))
    }

    async fn get_all(&self, query: &PageQuery) -> CoreResult<PaginatedList<E>> {
        self.page(query)
    }

    async fn create(&self, entity: &E) -> CoreResult<E> {
        let row = self.encode_row(entity)?;
        self.inner.store.insert(&self.key(&entity.id()), &row)?;
        self.touch();
        Ok(entity.clone())
    }

    async fn update(&self, entity: &E) -> CoreResult<E> {
        let key = self.key(&entity.id());
        if self.inner.store.get(&key)?.is_none() {
            return Err(Failure::not_found("").with_context("key", key));
        }
        let row = self.encode_row(entity)?;
        self.inner.store.put(&key, &row)?;
        self.touch();
        Ok(entity.clone())
    }

    async fn delete(&self, id: &E::Id) -> CoreResult<()> {
        if self.remove(id)? {
            Ok(())
        } else {
            Err(Failure::not_found("").with_context("key", self.key(id)))
        }
    }
}
