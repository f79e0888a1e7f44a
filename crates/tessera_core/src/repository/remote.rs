//! Repository over the remote-call interface.

use super::{Entity, PageQuery, Repository, WireCodec};
use crate::error::{CoreResult, Failure, TransportError};
use crate::pagination::PaginatedList;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Default deadline for one remote call.
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// Read.
    Get,
    /// Create.
    Post,
    /// Replace.
    Put,
    /// Delete.
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

/// A response as returned by the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    /// Status code.
    pub status: u16,
    /// Decoded JSON body (`Null` when empty).
    pub body: Value,
}

impl RawResponse {
    /// Creates a response.
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    /// A 200 response.
    pub fn ok(body: Value) -> Self {
        Self::new(200, body)
    }

    /// A 204 response.
    pub fn no_content() -> Self {
        Self::new(204, Value::Null)
    }

    /// Returns true for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The remote-call interface consumed by [`RemoteRepository`].
///
/// Implementations own the transport (HTTP client, auth headers, base
/// URL). They either return a [`RawResponse`] with any status or a
/// [`TransportError`] when no response was obtained.
#[async_trait]
pub trait RemoteCall: Send + Sync {
    /// Performs one call.
    ///
    /// `path` is relative to the backend root (`notes`, `notes/42`).
    /// `params` are query parameters in order.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when the call could not complete.
    async fn call(
        &self,
        method: Method,
        path: &str,
        params: &[(String, String)],
        body: Option<Value>,
    ) -> Result<RawResponse, TransportError>;
}

#[async_trait]
impl<R: RemoteCall + ?Sized> RemoteCall for Arc<R> {
    async fn call(
        &self,
        method: Method,
        path: &str,
        params: &[(String, String)],
        body: Option<Value>,
    ) -> Result<RawResponse, TransportError> {
        (**self).call(method, path, params, body).await
    }
}

/// A [`Repository`] backed by a remote resource collection.
///
/// Items live under `<resource>/<id>`; listing reads the collection
/// envelope `{"items": [...], "page": n, "pageSize": m, "totalItems": t}`
/// from `<resource>`. Every call is bounded by the configured timeout.
pub struct RemoteRepository<E, C> {
    remote: Arc<dyn RemoteCall>,
    resource: String,
    codec: C,
    timeout: Duration,
    _entity: std::marker::PhantomData<fn() -> E>,
}

impl<E: Entity, C: WireCodec<E>> RemoteRepository<E, C> {
    /// Creates a repository for `resource` (e.g. `"notes"`).
    pub fn new(remote: Arc<dyn RemoteCall>, resource: impl Into<String>, codec: C) -> Self {
        Self {
            remote,
            resource: resource.into().trim_matches('/').to_string(),
            codec,
            timeout: DEFAULT_CALL_TIMEOUT,
            _entity: std::marker::PhantomData,
        }
    }

    /// Sets the per-call timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The per-call timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The resource collection name.
    pub fn resource(&self) -> &str {
        &self.resource
    }

    fn item_path(&self, id: &E::Id) -> String {
        format!("{}/{}", self.resource, id)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        params: &[(String, String)],
        body: Option<Value>,
    ) -> CoreResult<Value> {
        debug!(%method, path, "remote call");
        let call = self.remote.call(method, path, params, body);
        let response = match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(Failure::timeout(format!(
                    "{method} {path} exceeded {:?}",
                    self.timeout
                ))
                .with_context("path", path))
            }
        };

        if response.is_success() {
            return Ok(response.body);
        }

        debug!(%method, path, status = response.status, "remote call rejected");
        Err(rejection(method, path, response))
    }
}

fn rejection(method: Method, path: &str, response: RawResponse) -> Failure {
    let body = match &response.body {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    // A conflict on create means the identity is taken, not that someone
    // else modified the row.
    let failure = if method == Method::Post && response.status == 409 {
        Failure::from(TransportError::UniqueViolation(body)).with_code("409")
    } else {
        Failure::from(TransportError::Http {
            status: response.status,
            body,
        })
    };
    failure.with_context("path", path)
}

#[async_trait]
impl<E: Entity, C: WireCodec<E>> Repository<E> for RemoteRepository<E, C> {
    async fn get_by_id(&self, id: &E::Id) -> CoreResult<E> {
        let body = self.send(Method::Get, &self.item_path(id), &[], None).await?;
        self.codec.decode(body)
    }

    async fn get_all(&self, query: &PageQuery) -> CoreResult<PaginatedList<E>> {
        let body = self
            .send(Method::Get, &self.resource, &query.to_params(), None)
            .await?;
        let envelope: PaginatedList<Value> = serde_json::from_value(body)
            .map_err(|e| Failure::from(TransportError::Decode(format!("bad envelope: {e}"))))?;
        envelope.try_map(|item| self.codec.decode(item))
    }

    async fn create(&self, entity: &E) -> CoreResult<E> {
        let wire = self.codec.encode(entity)?;
        let body = self
            .send(Method::Post, &self.resource, &[], Some(wire))
            .await?;
        self.codec.decode(body)
    }

    async fn update(&self, entity: &E) -> CoreResult<E> {
        let wire = self.codec.encode(entity)?;
        let body = self
            .send(Method::Put, &self.item_path(&entity.id()), &[], Some(wire))
            .await?;
        self.codec.decode(body)
    }

    async fn delete(&self, id: &E::Id) -> CoreResult<()> {
        self.send(Method::Delete, &self.item_path(id), &[], None)
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConflictCause, FailureKind};
    use crate::repository::JsonCodec;
    use parking_lot::Mutex;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Item {
        id: u32,
        name: String,
    }

    impl Entity for Item {
        type Id = u32;

        fn id(&self) -> u32 {
            self.id
        }
    }

    /// Replays a canned response and records the requests it saw.
    struct Canned {
        response: Mutex<Option<Result<RawResponse, TransportError>>>,
        seen: Mutex<Vec<(Method, String, Vec<(String, String)>)>>,
        delay: Option<Duration>,
    }

    impl Canned {
        fn new(response: Result<RawResponse, TransportError>) -> Arc<Self> {
            Arc::new(Self {
                response: Mutex::new(Some(response)),
                seen: Mutex::new(Vec::new()),
                delay: None,
            })
        }

        fn slow(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                response: Mutex::new(Some(Ok(RawResponse::no_content()))),
                seen: Mutex::new(Vec::new()),
                delay: Some(delay),
            })
        }
    }

    #[async_trait]
    impl RemoteCall for Canned {
        async fn call(
            &self,
            method: Method,
            path: &str,
            params: &[(String, String)],
            _body: Option<Value>,
        ) -> Result<RawResponse, TransportError> {
            self.seen
                .lock()
                .push((method, path.to_string(), params.to_vec()));
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.response
                .lock()
                .take()
                .unwrap_or_else(|| Err(TransportError::Other("no response".into())))
        }
    }

    fn repo(remote: Arc<Canned>) -> RemoteRepository<Item, JsonCodec<Item>> {
        RemoteRepository::new(remote, "/items/", JsonCodec::new())
    }

    #[tokio::test]
    async fn reads_collection_envelope() {
        let remote = Canned::new(Ok(RawResponse::ok(json!({
            "items": [{"id": 1, "name": "a"}, {"id": 2, "name": "b"}],
            "page": 1,
            "pageSize": 2,
            "totalItems": 5
        }))));
        let page = repo(remote.clone())
            .get_all(&PageQuery::first(2))
            .await
            .unwrap();

        assert_eq!(page.len(), 2);
        assert_eq!(page.total_items(), 5);
        assert!(page.has_more());

        let seen = remote.seen.lock();
        assert_eq!(seen[0].0, Method::Get);
        assert_eq!(seen[0].1, "items");
    }

    #[tokio::test]
    async fn maps_status_to_failure() {
        let remote = Canned::new(Ok(RawResponse::new(404, Value::Null)));
        let err = repo(remote).get_by_id(&7).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::NotFound);
        assert_eq!(
            err.detail().context.get("path").map(String::as_str),
            Some("items/7")
        );
    }

    #[tokio::test]
    async fn conflict_on_create_is_unique_violation() {
        let remote = Canned::new(Ok(RawResponse::new(409, json!("id taken"))));
        let item = Item {
            id: 1,
            name: "a".into(),
        };
        let err = repo(remote).create(&item).await.unwrap_err();
        assert_eq!(err.conflict_cause(), Some(ConflictCause::UniqueViolation));
        assert_eq!(err.code(), Some("409"));
        assert!(!err.user_message().contains("id taken"));
        assert_eq!(
            err.detail().context.get("detail").map(String::as_str),
            Some("id taken")
        );
    }

    #[tokio::test]
    async fn conflict_on_update_is_concurrent_modification() {
        let remote = Canned::new(Ok(RawResponse::new(409, Value::Null)));
        let item = Item {
            id: 1,
            name: "a".into(),
        };
        let err = repo(remote).update(&item).await.unwrap_err();
        assert_eq!(
            err.conflict_cause(),
            Some(ConflictCause::ConcurrentModification)
        );
    }

    #[tokio::test]
    async fn transport_errors_are_mapped() {
        let remote = Canned::new(Err(TransportError::Connection("refused".into())));
        let err = repo(remote).delete(&3).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::Network);
    }

    #[tokio::test]
    async fn malformed_envelope_is_unexpected() {
        let remote = Canned::new(Ok(RawResponse::ok(json!({"rows": []}))));
        let err = repo(remote)
            .get_all(&PageQuery::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::Unexpected);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_call_times_out() {
        let remote = Canned::slow(Duration::from_secs(60));
        let err = repo(remote)
            .with_timeout(Duration::from_secs(5))
            .delete(&1)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::Timeout);
    }
}
