//! Upstream API access
//!
//! This module provides the seam between the sync logic and the network:
//!
//! 1. **Transport**: [`Transport`] abstracts the raw HTTP exchange so tests
//!    can script responses; [`ReqwestTransport`] is the production impl
//! 2. **Classification**: [`rate_limit::RateLimitedClient`] turns raw
//!    responses into success, rate-limit signal, or terminal error
//! 3. **Retry**: rate-limit retries are bounded and opt-in per call
//!
//! Only HTTP 429 is treated as transient. Auth failures, not-found,
//! validation errors, and upstream 5xx are surfaced immediately with the
//! remote status and body for the caller to interpret.

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use serde_json::Value;

pub mod rate_limit;

pub use rate_limit::{ApiOutcome, ApiResponse, RateLimitedClient};

/// API access errors
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Transport-level failure (timeout, connection refused, DNS)
    #[error("network error: {0}")]
    Network(String),

    /// Response body could not be parsed as JSON
    #[error("parse error: {0}")]
    Parse(String),

    /// Terminal remote error; never retried by this layer
    #[error("remote error: status {status}: {body}")]
    Remote {
        /// HTTP status returned by the upstream
        status: u16,
        /// Raw response body for the caller to interpret
        body: String,
    },

    /// Rate-limit retries exhausted without a non-429 response
    #[error("max retry attempts reached due to rate limiting (status 429, {attempts} attempts)")]
    RetriesExhausted {
        /// Number of attempts made before giving up
        attempts: u32,
    },
}

/// Result type for API operations
pub type ApiResult<T> = Result<T, ApiError>;

/// HTTP method for an upstream request.
///
/// GET requests are idempotent and safe to retry transparently; PUT/POST
/// retry only on the caller's explicit opt-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// Idempotent read
    Get,
    /// Full-resource write
    Put,
    /// Non-idempotent create
    Post,
}

impl Method {
    /// Whether retrying this method is safe without idempotency keys.
    pub fn is_idempotent(self) -> bool {
        matches!(self, Method::Get)
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Method::Get => "GET",
            Method::Put => "PUT",
            Method::Post => "POST",
        };
        write!(f, "{s}")
    }
}

/// A single upstream API request: method, endpoint path relative to
/// `/api/v2/`, and an optional JSON body.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// HTTP method
    pub method: Method,
    /// Endpoint path with interpolated parameters, e.g. `tickets/101`
    pub endpoint: String,
    /// JSON body for writes
    pub body: Option<Value>,
}

impl ApiRequest {
    /// Build a GET request.
    pub fn get(endpoint: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            endpoint: endpoint.into(),
            body: None,
        }
    }

    /// Build a PUT request with a JSON body.
    pub fn put(endpoint: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Put,
            endpoint: endpoint.into(),
            body: Some(body),
        }
    }

    /// Build a POST request with a JSON body.
    pub fn post(endpoint: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            endpoint: endpoint.into(),
            body: Some(body),
        }
    }
}

/// Raw HTTP exchange result as seen by the transport.
///
/// The `retry-after` header is surfaced distinctly from the body so the
/// client can classify rate limiting without re-parsing headers.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    /// HTTP status code
    pub status: u16,
    /// Parsed `retry-after` header in seconds, when present and numeric
    pub retry_after: Option<u64>,
    /// Raw response body
    pub body: String,
}

/// Generic HTTP transport seam.
///
/// Production code uses [`ReqwestTransport`]; tests substitute scripted
/// implementations.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Execute one HTTP exchange. `auth_header` is the complete
    /// `Authorization` header value.
    ///
    /// Only transport-level failures are errors here; non-2xx statuses are
    /// returned as normal responses for the client to classify.
    async fn send(
        &self,
        method: Method,
        url: &str,
        auth_header: &str,
        body: Option<&Value>,
    ) -> ApiResult<TransportResponse>;
}

/// Production transport backed by a shared [`reqwest::Client`].
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Create a transport with a default client.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Create a transport from an existing client (shared pools, custom
    /// timeouts).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(
        &self,
        method: Method,
        url: &str,
        auth_header: &str,
        body: Option<&Value>,
    ) -> ApiResult<TransportResponse> {
        let mut request = match method {
            Method::Get => self.client.get(url),
            Method::Put => self.client.put(url),
            Method::Post => self.client.post(url),
        };

        request = request
            .header(AUTHORIZATION, auth_header)
            .header(CONTENT_TYPE, "application/json");

        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok());

        let body = response
            .text()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;

        Ok(TransportResponse {
            status,
            retry_after,
            body,
        })
    }
}
