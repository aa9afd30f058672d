//! Sweep and scan orchestration
//!
//! This module drives the complete synchronization workflows over the
//! primitives in [`crate::client`], [`crate::sweep`], and [`crate::ledger`]:
//!
//! 1. **Association sweep**: one page of ticket associations for an asset,
//!    detail fetches in concurrent batches, next-page ids prefetched so the
//!    caller always holds a resumable [`Cursor`]
//! 2. **Full scan**: walk every consumable asset and rebuild its quantity
//!    snapshots and aggregate from scratch
//! 3. **Assignment recording**: reconcile a single ticket's consumable
//!    assets through the [`QuantityLedger`]
//! 4. **Note posting**: non-idempotent write with an explicit 403 fallback
//!    policy
//!
//! Interactive entry points run the client in non-blocking rate-limit mode
//! and surface "retry after" to the caller; background scans run in
//! blocking mode and wait out throttle windows.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info, warn, Instrument};

use crate::client::rate_limit::{ApiOutcome, ApiResponse};
use crate::client::{ApiError, ApiRequest, ApiResult, RateLimitedClient, Transport};
use crate::config::{
    ASSET_PAGE_SIZE, ASSOCIATION_PAGE_SIZE, DEFAULT_MAX_ATTEMPTS, DETAIL_BATCH_SIZE,
    SCAN_PAGE_SIZE, SWEEP_MAX_ATTEMPTS,
};
use crate::credential::Credential;
use crate::ledger::{LedgerError, QuantityLedger, Reconciliation};
use crate::sweep::batch::{process_batches, ItemOutcome};
use crate::sweep::identifiers::ids_from_requests;
use crate::sweep::pagination::Paginator;
use crate::sweep::{Cursor, SweepError};
use crate::AssetAssignment;

/// Synchronization errors
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Upstream API error
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Sweep-level error
    #[error("sweep error: {0}")]
    Sweep(#[from] SweepError),

    /// Ledger error
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

/// Result type for sync operations
pub type SyncResult<T> = Result<T, SyncError>;

/// What to do when posting a note on behalf of a user is forbidden.
///
/// Some accounts reject third-party notes attributed to a requester with
/// 403. The observed production behavior is to retry once without the
/// attribution, degrading to an anonymous note; callers that must not
/// degrade opt into `Strict`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActingUserFallback {
    /// Retry exactly once with the acting user dropped (default)
    #[default]
    DropOnForbidden,
    /// Surface the 403 unchanged
    Strict,
}

/// One page of an association sweep, plus everything needed to continue it.
#[derive(Debug)]
pub struct SweepPage {
    /// Assignments fetched on this invocation, listing order preserved
    pub items: Vec<AssetAssignment>,
    /// Where to resume; `None` when the sweep is complete
    pub next_cursor: Option<Cursor>,
    /// Whether the sweep has reached the last page
    pub is_last: bool,
    /// Whether this invocation was cut short by the upstream rate limit
    pub rate_limited: bool,
    /// Wait hint in seconds when `rate_limited` is set
    pub retry_after_secs: Option<u64>,
}

/// Summary of a full scan.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanSummary {
    /// Discovered consumable asset-type id; `None` when absent upstream
    pub consumable_type_id: Option<u64>,
    /// Assets whose aggregates were rebuilt
    pub assets_scanned: usize,
    /// Quantity snapshots written
    pub tickets_recorded: usize,
}

/// Orchestrates ticket/asset synchronization against one upstream API.
pub struct TicketSync {
    client: RateLimitedClient,
    page_size: usize,
    batch_size: usize,
    max_attempts: u32,
    consumable_type_name: String,
}

impl TicketSync {
    /// Create a sync orchestrator over the given transport.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            client: RateLimitedClient::new(transport),
            page_size: ASSOCIATION_PAGE_SIZE,
            batch_size: DETAIL_BATCH_SIZE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            consumable_type_name: "Consumable".to_string(),
        }
    }

    /// Override the association listing page size.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Override the concurrent detail-fetch batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Override the rate-limit retry bound for interactive calls.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Override the asset-type name treated as consumable.
    pub fn with_consumable_type_name(mut self, name: impl Into<String>) -> Self {
        self.consumable_type_name = name.into();
        self
    }

    /// Fetch one page of ticket associations for an asset.
    ///
    /// With [`Cursor::NextPage`] the association listing is fetched first;
    /// with [`Cursor::ResumeIds`] the listing is skipped and exactly the
    /// given ids are processed. Detail fetches run in concurrent batches;
    /// on success the next page's ids are prefetched so the returned cursor
    /// lets the caller continue without re-listing.
    ///
    /// Rate limiting never surfaces as an error here: it produces a page
    /// with `rate_limited` set, the wait hint, and a cursor that resumes
    /// exactly where the sweep stopped.
    pub async fn sweep_associations(
        &self,
        credential: &Credential,
        asset_display_id: u64,
        cursor: Cursor,
    ) -> SyncResult<SweepPage> {
        let span = tracing::info_span!(
            "sweep_associations",
            domain = %credential.domain(),
            asset = asset_display_id
        );
        self.sweep_associations_inner(credential, asset_display_id, cursor)
            .instrument(span)
            .await
    }

    async fn sweep_associations_inner(
        &self,
        credential: &Credential,
        asset_display_id: u64,
        cursor: Cursor,
    ) -> SyncResult<SweepPage> {
        // Determine which ids to fetch.
        let (page, fetch_ids, fetch_next_page) = match cursor {
            Cursor::NextPage { page } => {
                let outcome = self
                    .client
                    .call(
                        &self.listing_request(asset_display_id, page),
                        credential,
                        self.max_attempts,
                        false,
                    )
                    .await?;

                let response = match outcome {
                    ApiOutcome::RateLimited { retry_after_secs } => {
                        debug!(page, retry_after_secs, "listing fetch rate limited");
                        return Ok(SweepPage {
                            items: Vec::new(),
                            next_cursor: Some(Cursor::NextPage { page }),
                            is_last: false,
                            rate_limited: true,
                            retry_after_secs: Some(retry_after_secs),
                        });
                    }
                    ApiOutcome::Success(response) => response,
                };

                let requests = array_field(&response.body, "requests");
                let has_full_page = requests.len() >= self.page_size;
                (page, ids_from_requests(&requests), has_full_page)
            }
            // Already-listed ids: process exactly these, no listing fetch.
            Cursor::ResumeIds { page, ids } => (page, ids, true),
        };

        let outcome = process_batches(&fetch_ids, self.batch_size, |ticket_id| {
            self.fetch_assignment(credential, ticket_id, asset_display_id, false)
        })
        .await;

        let items: Vec<AssetAssignment> = outcome
            .results
            .into_iter()
            .map(|(_, assignment)| assignment)
            .collect();

        if let Some(interruption) = outcome.interruption {
            info!(
                page,
                fetched = items.len(),
                remaining = interruption.remaining_ids.len(),
                retry_after_secs = interruption.retry_after_secs,
                "sweep interrupted by rate limit"
            );
            return Ok(SweepPage {
                items,
                next_cursor: Some(Cursor::ResumeIds {
                    page,
                    ids: interruption.remaining_ids,
                }),
                is_last: false,
                rate_limited: true,
                retry_after_secs: Some(interruption.retry_after_secs),
            });
        }

        // Prefetch the next page's ids so the caller can resume without
        // re-listing.
        let mut next_ids = Vec::new();
        if fetch_next_page {
            let next_page = page + 1;
            match self
                .client
                .call(
                    &self.listing_request(asset_display_id, next_page),
                    credential,
                    self.max_attempts,
                    false,
                )
                .await
            {
                Ok(ApiOutcome::RateLimited { retry_after_secs }) => {
                    return Ok(SweepPage {
                        items,
                        next_cursor: Some(Cursor::NextPage { page: next_page }),
                        is_last: false,
                        rate_limited: true,
                        retry_after_secs: Some(retry_after_secs),
                    });
                }
                Ok(ApiOutcome::Success(response)) => {
                    next_ids = ids_from_requests(&array_field(&response.body, "requests"));
                }
                Err(error) => {
                    warn!(error = %error, page = next_page, "next-page prefetch failed; ending sweep");
                }
            }
        }

        let is_last = next_ids.is_empty();
        let next_cursor = (!is_last).then(|| Cursor::ResumeIds {
            page: page + 1,
            ids: next_ids,
        });

        debug!(page, items = items.len(), is_last, "sweep page complete");
        Ok(SweepPage {
            items,
            next_cursor,
            is_last,
            rate_limited: false,
            retry_after_secs: None,
        })
    }

    /// Find the asset-type id whose name matches the configured consumable
    /// type, paging the type listing until found.
    pub async fn discover_consumable_type(
        &self,
        credential: &Credential,
    ) -> SyncResult<Option<u64>> {
        let paginator = Paginator::new(&self.client, credential);
        let found = paginator
            .find_first(
                &format!("asset_types?per_page={SCAN_PAGE_SIZE}"),
                "asset_types",
                SCAN_PAGE_SIZE,
                |asset_type| {
                    asset_type.get("name").and_then(Value::as_str)
                        == Some(self.consumable_type_name.as_str())
                },
            )
            .await?;
        Ok(found.and_then(|asset_type| asset_type.get("id").and_then(Value::as_u64)))
    }

    /// Rebuild quantity snapshots and aggregates for every consumable asset.
    ///
    /// Runs entirely in blocking rate-limit mode; aggregates are recomputed
    /// from scratch (absolute totals), not applied as deltas, so a scan
    /// also repairs drift.
    pub async fn full_scan(
        &self,
        credential: &Credential,
        ledger: &QuantityLedger,
    ) -> SyncResult<ScanSummary> {
        let span = tracing::info_span!("full_scan", domain = %credential.domain());
        self.full_scan_inner(credential, ledger).instrument(span).await
    }

    async fn full_scan_inner(
        &self,
        credential: &Credential,
        ledger: &QuantityLedger,
    ) -> SyncResult<ScanSummary> {
        let Some(type_id) = self.discover_consumable_type(credential).await? else {
            warn!(
                type_name = %self.consumable_type_name,
                "consumable asset type not found in any page; nothing to scan"
            );
            return Ok(ScanSummary::default());
        };
        info!(type_id, "discovered consumable asset type");

        let paginator = Paginator::new(&self.client, credential);
        let assets = paginator
            .fetch_all_pages(
                &format!("assets?filter=\"asset_type_id:{type_id}\""),
                "assets",
                ASSET_PAGE_SIZE,
            )
            .await?;
        let asset_ids: Vec<u64> = assets
            .iter()
            .filter_map(|asset| asset.get("display_id").and_then(Value::as_u64))
            .collect();
        info!(assets = asset_ids.len(), "scanning consumable assets");

        let domain = credential.domain();
        let mut tickets_recorded = 0usize;

        for &asset_id in &asset_ids {
            let requests = paginator
                .fetch_all_pages(
                    &format!("assets/{asset_id}/requests?per_page={SCAN_PAGE_SIZE}"),
                    "requests",
                    SCAN_PAGE_SIZE,
                )
                .await?;
            let ticket_ids = ids_from_requests(&requests);

            let outcome = process_batches(&ticket_ids, self.batch_size, |ticket_id| {
                self.fetch_assignment(credential, ticket_id, asset_id, true)
            })
            .await;

            let mut total_quantity = 0i64;
            for (ticket_id, assignment) in outcome.results {
                total_quantity += assignment.quantity;
                ledger
                    .record_snapshot(domain, asset_id, ticket_id, assignment)
                    .await?;
                tickets_recorded += 1;
            }
            ledger.set_aggregate(domain, asset_id, total_quantity).await?;
            debug!(asset_id, total_quantity, "asset aggregate rebuilt");
        }

        Ok(ScanSummary {
            consumable_type_id: Some(type_id),
            assets_scanned: asset_ids.len(),
            tickets_recorded,
        })
    }

    /// Reconcile one ticket's consumable assets through the ledger.
    ///
    /// Fetches the ticket with its assets, keeps those of the consumable
    /// type, and reconciles each quantity snapshot; re-observations apply
    /// deltas, so repeated calls for the same ticket never double-count.
    pub async fn record_assignment(
        &self,
        credential: &Credential,
        ledger: &QuantityLedger,
        consumable_type_id: u64,
        ticket_id: u64,
        requester_name: Option<String>,
        requester_email: Option<String>,
    ) -> SyncResult<Vec<Reconciliation>> {
        let request = ApiRequest::get(format!("tickets/{ticket_id}?include=assets"));
        let response = expect_success(
            self.client
                .call(&request, credential, self.max_attempts, true)
                .await?,
        )?;

        let assets: Vec<Value> = response.body["ticket"]["assets"]
            .as_array()
            .map(|assets| {
                assets
                    .iter()
                    .filter(|asset| {
                        asset.get("ci_type_id").and_then(Value::as_u64) == Some(consumable_type_id)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        let domain = credential.domain();
        let mut reconciliations = Vec::new();

        for chunk in assets.chunks(self.batch_size.max(1)) {
            let settled = futures::future::join_all(chunk.iter().filter_map(|asset| {
                let asset_id = asset.get("display_id").and_then(Value::as_u64)?;
                let assignment = AssetAssignment {
                    ticket_label: format!("SR#{ticket_id}"),
                    requester_name: requester_name.clone(),
                    requester_email: requester_email.clone(),
                    quantity: asset.get("quantity").and_then(Value::as_i64).unwrap_or(0),
                };
                Some(ledger.reconcile(domain, asset_id, ticket_id, assignment))
            }))
            .await;

            for result in settled {
                reconciliations.push(result?);
            }
        }

        Ok(reconciliations)
    }

    /// Post a note on a ticket, optionally attributed to an acting user.
    ///
    /// Runs in blocking rate-limit mode (the caller opted into retrying this
    /// non-idempotent write). On 403 with an acting user present, the
    /// configured [`ActingUserFallback`] decides whether to retry once
    /// without the attribution.
    pub async fn post_note(
        &self,
        credential: &Credential,
        ticket_id: u64,
        body_html: &str,
        acting_user: Option<u64>,
        fallback: ActingUserFallback,
    ) -> SyncResult<ApiResponse> {
        let endpoint = format!("tickets/{ticket_id}/notes");
        let mut payload = json!({ "body": body_html });
        if let Some(user_id) = acting_user {
            payload["user_id"] = json!(user_id);
        }

        let result = self
            .client
            .call(
                &ApiRequest::post(&endpoint, payload),
                credential,
                self.max_attempts,
                true,
            )
            .await;

        match result {
            Ok(outcome) => expect_success(outcome),
            Err(ApiError::Remote { status: 403, .. })
                if acting_user.is_some() && fallback == ActingUserFallback::DropOnForbidden =>
            {
                warn!(
                    ticket_id,
                    "note creation forbidden for acting user; retrying without attribution"
                );
                let outcome = self
                    .client
                    .call(
                        &ApiRequest::post(&endpoint, json!({ "body": body_html })),
                        credential,
                        self.max_attempts,
                        true,
                    )
                    .await?;
                expect_success(outcome)
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Update fields on a ticket.
    ///
    /// Non-idempotent write with explicit retry opt-in; mandatory-field
    /// validation is bypassed so partial updates go through.
    pub async fn update_ticket(
        &self,
        credential: &Credential,
        ticket_id: u64,
        fields: Value,
    ) -> SyncResult<ApiResponse> {
        let request = ApiRequest::put(
            format!("tickets/{ticket_id}?bypass_mandatory:true"),
            fields,
        );
        let outcome = self
            .client
            .call(&request, credential, self.max_attempts, true)
            .await?;
        expect_success(outcome)
    }

    fn listing_request(&self, asset_display_id: u64, page: u32) -> ApiRequest {
        ApiRequest::get(format!(
            "assets/{asset_display_id}/requests?per_page={}&page={page}",
            self.page_size
        ))
    }

    /// Fetch one ticket's detail and shape it into an assignment for the
    /// given asset. Blocking mode waits out rate limits; non-blocking mode
    /// reports them as an [`ItemOutcome::RateLimited`].
    async fn fetch_assignment(
        &self,
        credential: &Credential,
        ticket_id: u64,
        asset_display_id: u64,
        blocking: bool,
    ) -> ApiResult<ItemOutcome<(u64, AssetAssignment)>> {
        let request = ApiRequest::get(format!("tickets/{ticket_id}?include=requester,assets"));
        let (max_attempts, retry) = if blocking {
            (SWEEP_MAX_ATTEMPTS, true)
        } else {
            (self.max_attempts, false)
        };

        match self.client.call(&request, credential, max_attempts, retry).await? {
            ApiOutcome::RateLimited { retry_after_secs } => {
                Ok(ItemOutcome::RateLimited { retry_after_secs })
            }
            ApiOutcome::Success(response) => {
                Ok(match shape_assignment(&response.body, asset_display_id) {
                    Some(shaped) => ItemOutcome::Item(shaped),
                    None => ItemOutcome::Skipped,
                })
            }
        }
    }
}

/// Shape a raw ticket response into (ticket id, assignment) for one asset.
///
/// The quantity comes from the ticket's view of that asset and defaults to
/// zero when the asset is not attached or carries no quantity.
fn shape_assignment(body: &Value, asset_display_id: u64) -> Option<(u64, AssetAssignment)> {
    let ticket = body.get("ticket")?;
    let ticket_id = ticket.get("id").and_then(Value::as_u64)?;

    let quantity = ticket
        .get("assets")
        .and_then(Value::as_array)
        .and_then(|assets| {
            assets.iter().find(|asset| {
                asset.get("display_id").and_then(Value::as_u64) == Some(asset_display_id)
            })
        })
        .and_then(|asset| asset.get("quantity").and_then(Value::as_i64))
        .unwrap_or(0);

    let requester = ticket.get("requester");
    Some((
        ticket_id,
        AssetAssignment {
            ticket_label: format!("SR#{ticket_id}"),
            requester_name: requester
                .and_then(|r| r.get("name"))
                .and_then(Value::as_str)
                .map(str::to_string),
            requester_email: requester
                .and_then(|r| r.get("email"))
                .and_then(Value::as_str)
                .map(str::to_string),
            quantity,
        },
    ))
}

fn array_field(body: &Value, field: &str) -> Vec<Value> {
    body.get(field)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

fn expect_success(outcome: ApiOutcome) -> SyncResult<ApiResponse> {
    match outcome {
        ApiOutcome::Success(response) => Ok(response),
        // Blocking mode cannot produce this; surfaced rather than dropped.
        ApiOutcome::RateLimited { retry_after_secs } => {
            Err(SweepError::RateLimited { retry_after_secs }.into())
        }
    }
}
