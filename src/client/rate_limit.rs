//! Rate-limited API client
//!
//! Issues a single logical call against the upstream API and classifies the
//! response. HTTP 429 is the only transient status: depending on caller
//! intent it is either waited out with a bounded backoff loop or surfaced as
//! a structured signal carrying the wait hint. Everything else resolves on
//! the first attempt.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::client::{ApiError, ApiRequest, ApiResult, Transport};
use crate::config::fallback_retry_after;
use crate::credential::Credential;

/// Successful upstream response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// HTTP status (2xx)
    pub status: u16,
    /// Parsed JSON body; `Null` for empty bodies
    pub body: Value,
    /// Attempts consumed, 1-indexed; observable for callers and tests
    pub attempts: u32,
}

/// Outcome of a rate-limited call.
///
/// `RateLimited` is only produced when the caller opted out of blocking
/// retries; it carries the wait hint so an upstream scheduler can decide
/// when to re-invoke instead of this layer sleeping.
#[derive(Debug, Clone)]
pub enum ApiOutcome {
    /// The call succeeded
    Success(ApiResponse),
    /// The upstream throttled the call and the caller asked not to wait
    RateLimited {
        /// Seconds to wait before retrying, from the `retry-after` header
        /// or the per-attempt fallback
        retry_after_secs: u64,
    },
}

impl ApiOutcome {
    /// The successful response, if any.
    pub fn success(self) -> Option<ApiResponse> {
        match self {
            ApiOutcome::Success(response) => Some(response),
            ApiOutcome::RateLimited { .. } => None,
        }
    }
}

/// Retry loop state; attempting and waiting alternate until the call
/// resolves or attempts are exhausted.
enum RetryState {
    Attempting,
    Waiting(Duration),
    Exhausted,
}

/// Client that executes upstream API calls under the rate-limit contract.
pub struct RateLimitedClient {
    transport: Arc<dyn Transport>,
}

impl RateLimitedClient {
    /// Create a client over the given transport.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Execute one logical API call.
    ///
    /// # Arguments
    /// * `request` - method, endpoint, optional body
    /// * `credential` - API key and domain; the key is never logged
    /// * `max_attempts` - bound on rate-limit retries
    /// * `retry_on_rate_limit` - when true, 429 responses are waited out
    ///   (cooperative sleep, other in-flight calls unaffected); when false,
    ///   the first 429 returns [`ApiOutcome::RateLimited`] immediately
    ///
    /// # Errors
    /// * [`ApiError::Remote`] for any non-2xx, non-429 status, immediately
    /// * [`ApiError::Network`] for transport failures, immediately
    /// * [`ApiError::RetriesExhausted`] after `max_attempts` rate-limited
    ///   attempts in blocking mode
    pub async fn call(
        &self,
        request: &ApiRequest,
        credential: &Credential,
        max_attempts: u32,
        retry_on_rate_limit: bool,
    ) -> ApiResult<ApiOutcome> {
        let url = format!(
            "https://{}/api/v2/{}",
            credential.domain(),
            request.endpoint
        );
        let auth_header = credential.basic_auth();

        // Attempt counter is 1-indexed once a rate limit is hit; it feeds
        // the fallback wait and is reported on exhaustion.
        let mut attempt: u32 = 0;
        let mut state = RetryState::Attempting;

        loop {
            match state {
                RetryState::Attempting => {
                    debug!(method = %request.method, endpoint = %request.endpoint, "calling upstream API");

                    let response = self
                        .transport
                        .send(request.method, &url, &auth_header, request.body.as_ref())
                        .await?;

                    if (200..300).contains(&response.status) {
                        let body = parse_body(&response.body)?;
                        return Ok(ApiOutcome::Success(ApiResponse {
                            status: response.status,
                            body,
                            attempts: attempt + 1,
                        }));
                    }

                    if response.status == 429 {
                        attempt += 1;
                        let retry_after_secs = response
                            .retry_after
                            .unwrap_or_else(|| fallback_retry_after(attempt));

                        if !retry_on_rate_limit {
                            debug!(
                                retry_after_secs,
                                endpoint = %request.endpoint,
                                "rate limited; surfacing signal to caller"
                            );
                            return Ok(ApiOutcome::RateLimited { retry_after_secs });
                        }

                        warn!(
                            retry_after_secs,
                            attempt,
                            max_attempts,
                            endpoint = %request.endpoint,
                            "rate limit hit; waiting before retry"
                        );
                        state = if attempt >= max_attempts {
                            RetryState::Exhausted
                        } else {
                            RetryState::Waiting(Duration::from_secs(retry_after_secs))
                        };
                        continue;
                    }

                    // Non-transient: auth failure, not-found, validation
                    // error, upstream 5xx. Surfaced verbatim, never retried.
                    return Err(ApiError::Remote {
                        status: response.status,
                        body: response.body,
                    });
                }
                RetryState::Waiting(delay) => {
                    sleep(delay).await;
                    state = RetryState::Attempting;
                }
                RetryState::Exhausted => {
                    return Err(ApiError::RetriesExhausted { attempts: attempt });
                }
            }
        }
    }
}

fn parse_body(body: &str) -> ApiResult<Value> {
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(body).map_err(|e| ApiError::Parse(e.to_string()))
}
