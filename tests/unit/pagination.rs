//! Unit tests for full-sweep pagination

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use helpdesk_sync::client::{
    ApiError, ApiResult, Method, RateLimitedClient, Transport, TransportResponse,
};
use helpdesk_sync::sweep::pagination::Paginator;
use helpdesk_sync::sweep::SweepError;
use helpdesk_sync::Credential;

struct ScriptedTransport {
    responses: Mutex<VecDeque<ApiResult<TransportResponse>>>,
    urls: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    fn new(responses: Vec<ApiResult<TransportResponse>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            urls: Mutex::new(Vec::new()),
        })
    }

    fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(
        &self,
        _method: Method,
        url: &str,
        _auth_header: &str,
        _body: Option<&Value>,
    ) -> ApiResult<TransportResponse> {
        self.urls.lock().unwrap().push(url.to_string());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ApiError::Network("script exhausted".to_string())))
    }
}

fn page_of(field: &str, ids: std::ops::Range<u64>) -> ApiResult<TransportResponse> {
    let items: Vec<Value> = ids.map(|id| json!({"id": id})).collect();
    Ok(TransportResponse {
        status: 200,
        retry_after: None,
        body: json!({ field: items }).to_string(),
    })
}

fn credential() -> Credential {
    Credential::new("key", "example.freshservice.com")
}

#[tokio::test]
async fn test_concatenates_pages_in_order_until_short_page() {
    let transport = ScriptedTransport::new(vec![
        page_of("assets", 0..10),
        page_of("assets", 10..20),
        page_of("assets", 20..29),
    ]);
    let client = RateLimitedClient::new(transport.clone());
    let credential = credential();
    let paginator = Paginator::new(&client, &credential);

    let items = paginator
        .fetch_all_pages("assets", "assets", 10)
        .await
        .unwrap();

    assert_eq!(items.len(), 29);
    // Page order and item order within pages preserved.
    let ids: Vec<u64> = items.iter().map(|i| i["id"].as_u64().unwrap()).collect();
    assert_eq!(ids, (0..29).collect::<Vec<u64>>());
    assert_eq!(transport.urls().len(), 3);
}

#[tokio::test]
async fn test_full_page_requests_the_next_one() {
    // Exactly page_size items: not structurally last, so page 2 is fetched
    // and its empty response terminates the sweep.
    let transport = ScriptedTransport::new(vec![
        page_of("assets", 0..10),
        page_of("assets", 0..0),
    ]);
    let client = RateLimitedClient::new(transport.clone());
    let credential = credential();
    let paginator = Paginator::new(&client, &credential);

    let items = paginator
        .fetch_all_pages("assets", "assets", 10)
        .await
        .unwrap();

    assert_eq!(items.len(), 10);
    assert_eq!(transport.urls().len(), 2);
}

#[tokio::test]
async fn test_short_page_stops_immediately() {
    let transport = ScriptedTransport::new(vec![page_of("assets", 0..9)]);
    let client = RateLimitedClient::new(transport.clone());
    let credential = credential();
    let paginator = Paginator::new(&client, &credential);

    let items = paginator
        .fetch_all_pages("assets", "assets", 10)
        .await
        .unwrap();

    assert_eq!(items.len(), 9);
    assert_eq!(transport.urls().len(), 1);
}

#[tokio::test]
async fn test_missing_array_field_treated_as_end() {
    let transport = ScriptedTransport::new(vec![Ok(TransportResponse {
        status: 200,
        retry_after: None,
        body: json!({"unexpected": "shape"}).to_string(),
    })]);
    let client = RateLimitedClient::new(transport.clone());
    let credential = credential();
    let paginator = Paginator::new(&client, &credential);

    let items = paginator
        .fetch_all_pages("assets", "assets", 10)
        .await
        .unwrap();

    assert!(items.is_empty());
}

#[tokio::test]
async fn test_page_parameter_respects_existing_query_string() {
    let transport = ScriptedTransport::new(vec![page_of("requests", 0..3)]);
    let client = RateLimitedClient::new(transport.clone());
    let credential = credential();
    let paginator = Paginator::new(&client, &credential);

    paginator
        .fetch_all_pages("assets/42/requests?per_page=100", "requests", 100)
        .await
        .unwrap();

    let urls = transport.urls();
    assert!(urls[0].ends_with("assets/42/requests?per_page=100&page=1"));
}

#[tokio::test]
async fn test_bare_endpoint_gets_question_mark_separator() {
    let transport = ScriptedTransport::new(vec![page_of("assets", 0..1)]);
    let client = RateLimitedClient::new(transport.clone());
    let credential = credential();
    let paginator = Paginator::new(&client, &credential);

    paginator.fetch_all_pages("assets", "assets", 10).await.unwrap();

    assert!(transport.urls()[0].ends_with("assets?page=1"));
}

#[tokio::test]
async fn test_terminal_error_discards_partial_results() {
    let transport = ScriptedTransport::new(vec![
        page_of("assets", 0..10),
        Ok(TransportResponse {
            status: 403,
            retry_after: None,
            body: "forbidden".to_string(),
        }),
    ]);
    let client = RateLimitedClient::new(transport.clone());
    let credential = credential();
    let paginator = Paginator::new(&client, &credential);

    let result = paginator.fetch_all_pages("assets", "assets", 10).await;

    assert!(matches!(
        result,
        Err(SweepError::Api(ApiError::Remote { status: 403, .. }))
    ));
}

#[tokio::test]
async fn test_find_first_stops_on_match() {
    let transport = ScriptedTransport::new(vec![
        Ok(TransportResponse {
            status: 200,
            retry_after: None,
            body: json!({"asset_types": (0..100).map(|i| json!({"id": i, "name": format!("Type {i}")})).collect::<Vec<_>>()})
                .to_string(),
        }),
        Ok(TransportResponse {
            status: 200,
            retry_after: None,
            body: json!({"asset_types": [
                {"id": 200, "name": "Consumable"},
                {"id": 201, "name": "Other"}
            ]})
            .to_string(),
        }),
    ]);
    let client = RateLimitedClient::new(transport.clone());
    let credential = credential();
    let paginator = Paginator::new(&client, &credential);

    let found = paginator
        .find_first("asset_types?per_page=100", "asset_types", 100, |t| {
            t["name"] == "Consumable"
        })
        .await
        .unwrap();

    assert_eq!(found.unwrap()["id"], 200);
    assert_eq!(transport.urls().len(), 2);
}

#[tokio::test]
async fn test_find_first_returns_none_when_exhausted() {
    let transport = ScriptedTransport::new(vec![page_of("asset_types", 0..5)]);
    let client = RateLimitedClient::new(transport.clone());
    let credential = credential();
    let paginator = Paginator::new(&client, &credential);

    let found = paginator
        .find_first("asset_types?per_page=100", "asset_types", 100, |t| {
            t["name"] == "Consumable"
        })
        .await
        .unwrap();

    assert!(found.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_sweep_waits_out_rate_limit_and_continues() {
    let transport = ScriptedTransport::new(vec![
        Ok(TransportResponse {
            status: 429,
            retry_after: Some(5),
            body: "{}".to_string(),
        }),
        page_of("assets", 0..4),
    ]);
    let client = RateLimitedClient::new(transport.clone());
    let credential = credential();
    let paginator = Paginator::new(&client, &credential);

    let items = paginator
        .fetch_all_pages("assets", "assets", 10)
        .await
        .unwrap();

    assert_eq!(items.len(), 4);
    assert_eq!(transport.urls().len(), 2);
}
