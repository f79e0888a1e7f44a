//! In-memory backend implementing the remote-call interface.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tessera_core::repository::Filter;
use tessera_core::{Method, PaginatedList, RawResponse, RemoteCall, Sort, TransportError};

/// A call the backend received.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// Method.
    pub method: Method,
    /// Path, e.g. `notes/3f2c...`.
    pub path: String,
    /// Query parameters.
    pub params: Vec<(String, String)>,
    /// Request body.
    pub body: Option<Value>,
}

impl RecordedCall {
    /// The `id` field of the request body, if any.
    pub fn body_id(&self) -> Option<String> {
        self.body
            .as_ref()
            .and_then(|b| b.get("id"))
            .map(|id| match id {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
    }

    /// Returns true if the path or body refers to `id`.
    pub fn targets(&self, id: &str) -> bool {
        self.path.ends_with(&format!("/{id}")) || self.body_id().as_deref() == Some(id)
    }
}

/// What an injected fault does to a matching call.
#[derive(Debug, Clone, PartialEq)]
pub enum Fault {
    /// Fail with a connection error.
    Offline,
    /// Answer with this status and an error body.
    Status(u16),
    /// Sleep before handling the call normally.
    Delay(Duration),
}

type Matcher = Box<dyn Fn(&RecordedCall) -> bool + Send + Sync>;

struct Rule {
    matcher: Matcher,
    fault: Fault,
    remaining: Option<usize>,
}

#[derive(Default)]
struct State {
    resources: BTreeMap<String, BTreeMap<String, Value>>,
    calls: Vec<RecordedCall>,
    rules: Vec<Rule>,
}

/// A REST-shaped fake backend.
///
/// Resources are collections of JSON objects keyed by their `id` field.
/// Objects carrying a numeric `version` field get optimistic concurrency:
/// a `PUT` whose version differs from the stored one is answered with
/// `409`, and each accepted write bumps the stored version.
#[derive(Default)]
pub struct FakeBackend {
    state: Mutex<State>,
}

impl FakeBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies `fault` to every call matching `matcher`.
    pub fn fail_when(
        &self,
        matcher: impl Fn(&RecordedCall) -> bool + Send + Sync + 'static,
        fault: Fault,
    ) {
        self.state.lock().rules.push(Rule {
            matcher: Box::new(matcher),
            fault,
            remaining: None,
        });
    }

    /// Applies `fault` to the next `times` calls.
    pub fn fail_next(&self, times: usize, fault: Fault) {
        self.state.lock().rules.push(Rule {
            matcher: Box::new(|_| true),
            fault,
            remaining: Some(times),
        });
    }

    /// Removes every injected fault.
    pub fn heal(&self) {
        self.state.lock().rules.clear();
    }

    /// Stores `item` directly, as if another client had written it.
    pub fn seed(&self, resource: &str, item: Value) {
        let Some(id) = id_of(&item) else {
            return;
        };
        self.state
            .lock()
            .resources
            .entry(resource.to_string())
            .or_default()
            .insert(id, item);
    }

    /// Reads an item directly.
    pub fn item(&self, resource: &str, id: &str) -> Option<Value> {
        self.state
            .lock()
            .resources
            .get(resource)
            .and_then(|items| items.get(id))
            .cloned()
    }

    /// All items of a resource in id order.
    pub fn items(&self, resource: &str) -> Vec<Value> {
        self.state
            .lock()
            .resources
            .get(resource)
            .map(|items| items.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Every call received so far.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().calls.clone()
    }

    /// Number of calls received so far.
    pub fn call_count(&self) -> usize {
        self.state.lock().calls.len()
    }

    /// Calls with the given method.
    pub fn calls_with(&self, method: Method) -> Vec<RecordedCall> {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.method == method)
            .cloned()
            .collect()
    }

    fn fault_for(&self, call: &RecordedCall) -> Option<Fault> {
        let mut state = self.state.lock();
        state.calls.push(call.clone());
        let rule = state
            .rules
            .iter_mut()
            .find(|rule| rule.remaining != Some(0) && (rule.matcher)(call))?;
        if let Some(remaining) = rule.remaining.as_mut() {
            *remaining -= 1;
        }
        Some(rule.fault.clone())
    }

    fn handle(&self, call: &RecordedCall) -> RawResponse {
        let mut segments = call.path.splitn(2, '/');
        let resource = segments.next().unwrap_or_default().to_string();
        let id = segments.next().map(str::to_string);

        let mut state = self.state.lock();
        let items = state.resources.entry(resource).or_default();

        match (call.method, id) {
            (Method::Get, None) => list(items, &call.params),
            (Method::Get, Some(id)) => match items.get(&id) {
                Some(item) => RawResponse::ok(item.clone()),
                None => not_found(&id),
            },
            (Method::Post, None) => {
                let Some(mut item) = call.body.clone() else {
                    return error(422, "missing body");
                };
                let Some(id) = id_of(&item) else {
                    return error(422, "missing id");
                };
                if items.contains_key(&id) {
                    return error(409, "id already exists");
                }
                if item.get("version").is_some_and(Value::is_u64) {
                    item["version"] = json!(1);
                }
                items.insert(id, item.clone());
                RawResponse::new(201, item)
            }
            (Method::Put, Some(id)) => {
                let Some(mut item) = call.body.clone() else {
                    return error(422, "missing body");
                };
                let Some(stored) = items.get(&id) else {
                    return not_found(&id);
                };
                if let Some(current) = stored.get("version").and_then(Value::as_u64) {
                    if item.get("version").and_then(Value::as_u64) != Some(current) {
                        return error(409, "version mismatch");
                    }
                    item["version"] = json!(current + 1);
                }
                items.insert(id, item.clone());
                RawResponse::ok(item)
            }
            (Method::Delete, Some(id)) => match items.remove(&id) {
                Some(_) => RawResponse::no_content(),
                None => not_found(&id),
            },
            (method, _) => error(405, &format!("{method} not allowed on {}", call.path)),
        }
    }
}

#[async_trait]
impl RemoteCall for FakeBackend {
    async fn call(
        &self,
        method: Method,
        path: &str,
        params: &[(String, String)],
        body: Option<Value>,
    ) -> Result<RawResponse, TransportError> {
        let call = RecordedCall {
            method,
            path: path.trim_matches('/').to_string(),
            params: params.to_vec(),
            body,
        };
        match self.fault_for(&call) {
            Some(Fault::Offline) => {
                return Err(TransportError::Connection("backend unreachable".into()))
            }
            Some(Fault::Status(status)) => return Ok(error(status, "injected fault")),
            Some(Fault::Delay(delay)) => tokio::time::sleep(delay).await,
            None => {}
        }
        Ok(self.handle(&call))
    }
}

fn id_of(item: &Value) -> Option<String> {
    match item.get("id")? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn error(status: u16, message: &str) -> RawResponse {
    RawResponse::new(status, json!({ "error": message }))
}

fn not_found(id: &str) -> RawResponse {
    error(404, &format!("{id} not found"))
}

fn list(items: &BTreeMap<String, Value>, params: &[(String, String)]) -> RawResponse {
    let mut page = 1;
    let mut page_size = 20;
    let mut sort = None;
    let mut descending = false;
    let mut filter = Filter::default();

    for (name, value) in params {
        match name.as_str() {
            "page" => page = value.parse().unwrap_or(1),
            "pageSize" => page_size = value.parse().unwrap_or(20),
            "sort" => sort = Some(value.clone()),
            "order" => descending = value == "desc",
            _ => {
                let parsed = serde_json::from_str(value).unwrap_or(Value::String(value.clone()));
                filter = filter.and(name.clone(), parsed);
            }
        }
    }

    let mut rows: Vec<Value> = items
        .values()
        .filter(|row| filter.matches(row))
        .cloned()
        .collect();
    if let Some(field) = sort {
        let sort = if descending {
            Sort::descending(field)
        } else {
            Sort::ascending(field)
        };
        rows.sort_by(|a, b| sort.compare(a, b));
    }

    let envelope = PaginatedList::from_slice(&rows, page, page_size);
    RawResponse::ok(serde_json::to_value(&envelope).unwrap_or(Value::Null))
}
