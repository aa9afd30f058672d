//! Shared test doubles for integration tests

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};

use helpdesk_sync::client::{ApiResult, Method, Transport, TransportResponse};
use helpdesk_sync::store::{DocumentStore, RecordKey, StoreResult};

type RouteFn = Box<dyn Fn(Method, &str, Option<&Value>) -> ApiResult<TransportResponse> + Send + Sync>;

/// One request as seen by the transport.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: Method,
    pub url: String,
    pub body: Option<Value>,
}

/// Transport that dispatches on the requested URL and records every call.
///
/// Stateless by construction; tests needing per-call behavior capture their
/// own counters in the route closure.
pub struct RoutedTransport {
    route: RouteFn,
    calls: Mutex<Vec<RecordedCall>>,
}

impl RoutedTransport {
    pub fn new<F>(route: F) -> Self
    where
        F: Fn(Method, &str, Option<&Value>) -> ApiResult<TransportResponse>
            + Send
            + Sync
            + 'static,
    {
        Self {
            route: Box::new(route),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_matching(&self, fragment: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.url.contains(fragment))
            .collect()
    }
}

#[async_trait]
impl Transport for RoutedTransport {
    async fn send(
        &self,
        method: Method,
        url: &str,
        _auth_header: &str,
        body: Option<&Value>,
    ) -> ApiResult<TransportResponse> {
        self.calls.lock().unwrap().push(RecordedCall {
            method,
            url: url.to_string(),
            body: body.cloned(),
        });
        (self.route)(method, url, body)
    }
}

/// 2xx response with a JSON body.
pub fn ok(status: u16, body: Value) -> ApiResult<TransportResponse> {
    Ok(TransportResponse {
        status,
        retry_after: None,
        body: body.to_string(),
    })
}

/// 429 with an advertised wait.
pub fn throttled(retry_after_secs: u64) -> ApiResult<TransportResponse> {
    Ok(TransportResponse {
        status: 429,
        retry_after: Some(retry_after_secs),
        body: "{}".to_string(),
    })
}

/// Terminal error with a plain-text body.
pub fn remote_error(status: u16, body: &str) -> ApiResult<TransportResponse> {
    Ok(TransportResponse {
        status,
        retry_after: None,
        body: body.to_string(),
    })
}

/// Ticket detail body carrying one asset with a quantity.
pub fn ticket_body(ticket_id: u64, asset_display_id: u64, quantity: i64) -> Value {
    json!({
        "ticket": {
            "id": ticket_id,
            "requester": { "name": "Ada", "email": "ada@example.com" },
            "assets": [{ "display_id": asset_display_id, "quantity": quantity }]
        }
    })
}

/// Association listing body with `SR-` request ids.
pub fn requests_body(ids: &[u64]) -> Value {
    let requests: Vec<Value> = ids
        .iter()
        .map(|id| json!({ "request_id": format!("SR-{id}") }))
        .collect();
    json!({ "requests": requests })
}

/// In-memory store keyed by (collection, domain, sort key).
#[derive(Default)]
pub struct MemoryStore {
    documents: Mutex<HashMap<(String, String, String), Value>>,
}

impl MemoryStore {
    pub fn get(&self, collection: &str, domain: &str, sort_key: &str) -> Option<Value> {
        self.documents
            .lock()
            .unwrap()
            .get(&(
                collection.to_string(),
                domain.to_string(),
                sort_key.to_string(),
            ))
            .cloned()
    }

    pub fn document_count(&self) -> usize {
        self.documents.lock().unwrap().len()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn read_one(&self, collection: &str, key: &RecordKey) -> StoreResult<Option<Value>> {
        Ok(self.get(collection, &key.domain, &key.sort_key))
    }

    async fn upsert(&self, collection: &str, value: Value) -> StoreResult<()> {
        let domain = value["domain"].as_str().unwrap_or_default().to_string();
        let sort_key = match &value["assetId"] {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        self.documents
            .lock()
            .unwrap()
            .insert((collection.to_string(), domain, sort_key), value);
        Ok(())
    }
}
