//! Full-sweep pagination
//!
//! Walks a paginated endpoint to completion by appending a `page` query
//! parameter and accumulating a named array field across pages. The last
//! page is inferred structurally: a page shorter than the requested size, or
//! one whose array field is missing or empty. No server-provided total is
//! trusted.
//!
//! Sweeps run in blocking rate-limit mode (they are background jobs and may
//! wait out throttle windows). Results are all-or-nothing: a terminal error
//! on any page discards everything accumulated so far.

use serde_json::Value;
use tracing::debug;

use crate::client::{ApiOutcome, ApiRequest, RateLimitedClient};
use crate::config::{MAX_PAGINATION_ITERATIONS, SWEEP_MAX_ATTEMPTS};
use crate::credential::Credential;
use crate::sweep::{SweepError, SweepResult};

/// Full-sweep paginator over a rate-limited client.
pub struct Paginator<'a> {
    client: &'a RateLimitedClient,
    credential: &'a Credential,
}

impl<'a> Paginator<'a> {
    /// Create a paginator for one credentialed sweep.
    pub fn new(client: &'a RateLimitedClient, credential: &'a Credential) -> Self {
        Self { client, credential }
    }

    /// Fetch every page of `endpoint`, concatenating the `array_field`
    /// items in page order.
    ///
    /// # Arguments
    /// * `endpoint` - endpoint template; `page=N` is appended, respecting an
    ///   existing query string
    /// * `array_field` - response field holding the page's items
    /// * `page_size` - requested page size; a shorter page terminates the
    ///   sweep
    ///
    /// # Errors
    /// Any page failing terminally fails the whole sweep; partial results
    /// are not exposed.
    pub async fn fetch_all_pages(
        &self,
        endpoint: &str,
        array_field: &str,
        page_size: usize,
    ) -> SweepResult<Vec<Value>> {
        let mut all_items = Vec::new();
        self.walk_pages(endpoint, array_field, page_size, |items| {
            all_items.extend_from_slice(items);
            true
        })
        .await?;

        debug!(
            endpoint,
            total = all_items.len(),
            "pagination sweep complete"
        );
        Ok(all_items)
    }

    /// Page through `endpoint` until `predicate` matches an item, returning
    /// the first match.
    ///
    /// Stops early on a match; otherwise terminates on the same short-page
    /// rules as [`fetch_all_pages`](Self::fetch_all_pages) and returns
    /// `None`.
    pub async fn find_first<P>(
        &self,
        endpoint: &str,
        array_field: &str,
        page_size: usize,
        predicate: P,
    ) -> SweepResult<Option<Value>>
    where
        P: Fn(&Value) -> bool,
    {
        let mut found = None;
        self.walk_pages(endpoint, array_field, page_size, |items| {
            if let Some(item) = items.iter().find(|item| predicate(item)) {
                found = Some(item.clone());
                return false;
            }
            true
        })
        .await?;
        Ok(found)
    }

    /// Shared page loop. `visit` sees each page's items and returns whether
    /// the sweep should continue.
    async fn walk_pages<V>(
        &self,
        endpoint: &str,
        array_field: &str,
        page_size: usize,
        mut visit: V,
    ) -> SweepResult<()>
    where
        V: FnMut(&[Value]) -> bool,
    {
        let mut page: u32 = 1;
        let mut iteration = 0usize;

        loop {
            // Guard against a server that never produces a short page.
            if iteration >= MAX_PAGINATION_ITERATIONS {
                return Err(SweepError::PageLimitExceeded {
                    endpoint: endpoint.to_string(),
                    max_iterations: MAX_PAGINATION_ITERATIONS,
                });
            }

            let separator = if endpoint.contains('?') { '&' } else { '?' };
            let paged_endpoint = format!("{endpoint}{separator}page={page}");
            debug!(endpoint = %paged_endpoint, "fetching page");

            let outcome = self
                .client
                .call(
                    &ApiRequest::get(paged_endpoint),
                    self.credential,
                    SWEEP_MAX_ATTEMPTS,
                    true,
                )
                .await?;

            let response = match outcome {
                ApiOutcome::Success(response) => response,
                // Blocking mode cannot yield this; kept explicit so the
                // signal is never silently dropped.
                ApiOutcome::RateLimited { retry_after_secs } => {
                    return Err(SweepError::RateLimited { retry_after_secs });
                }
            };

            let items = response
                .body
                .get(array_field)
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();

            if items.is_empty() {
                debug!(page, "empty or missing page field; sweep done");
                break;
            }

            debug!(page, count = items.len(), "received page");
            let keep_going = visit(&items);

            if !keep_going || items.len() < page_size {
                break;
            }
            page += 1;
            iteration += 1;
        }

        Ok(())
    }
}
