//! # Helpdesk Sync Library
//!
//! A library for synchronizing ticket/asset data between a rate-limited,
//! paginated helpdesk REST API and a document store. Designed for backend
//! integration services that must walk large multi-page result sets under a
//! strict upstream rate limit without double-counting or losing updates.
//!
//! ## Features
//!
//! - **Rate-Limit Aware**: Every upstream call classifies HTTP 429 distinctly
//!   and either waits with backoff or surfaces a structured "retry after"
//!   signal, depending on caller intent
//! - **Full-Sweep Pagination**: Walks multi-page result sets to completion,
//!   inferring the last page structurally from a short page
//! - **Resumable Batching**: Detail fetches run in fixed-size concurrent
//!   batches; a rate-limit interruption yields a cursor the caller can resume
//!   from instead of restarting
//! - **Delta Reconciliation**: Re-observed ticket quantities are reconciled
//!   against the previously stored snapshot so aggregates stay consistent
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use helpdesk_sync::client::ReqwestTransport;
//! use helpdesk_sync::sweep::Cursor;
//! use helpdesk_sync::sync::TicketSync;
//! use helpdesk_sync::Credential;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = Arc::new(ReqwestTransport::new());
//! let sync = TicketSync::new(transport);
//! let credential = Credential::new("api-key", "example.freshservice.com");
//!
//! // Fetch one page of ticket associations for asset 42, starting fresh
//! let page = sync
//!     .sweep_associations(&credential, 42, Cursor::first())
//!     .await?;
//! if page.rate_limited {
//!     println!("retry after {:?} seconds", page.retry_after_secs);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! The library is organized into several core modules:
//!
//! - [`client`] - Transport seam and the rate-limited API client
//! - [`sweep`] - Pagination, batch fan-out, cursors, and identifier extraction
//! - [`ledger`] - Quantity snapshot / aggregate delta reconciliation
//! - [`store`] - Document store collaborator interface
//! - [`sync`] - High-level sweep and scan orchestration
//! - [`credential`] - API credential handling and decryption seam

#![warn(missing_docs)]
#![warn(clippy::all)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Rate-limited API client and transport seam
pub mod client;

/// Tuned operational constants
pub mod config;

/// API credential handling
pub mod credential;

/// Quantity/aggregate reconciliation
pub mod ledger;

/// Document store collaborator interface
pub mod store;

/// Pagination, batching, cursors, and identifier extraction
pub mod sweep;

/// High-level sweep and scan orchestration
pub mod sync;

// Re-export commonly used types
pub use credential::Credential;

/// One ticket's view of an asset: who requested it and how many units the
/// ticket currently reports.
///
/// This is a point-in-time snapshot as last reported by the ticket, not a
/// running sum.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssetAssignment {
    /// Display label for the ticket (e.g., "SR#101")
    #[serde(rename = "ticketId")]
    pub ticket_label: String,
    /// Requester's display name, when the ticket carries one
    #[serde(rename = "requesterName")]
    pub requester_name: Option<String>,
    /// Requester's email, when the ticket carries one
    #[serde(rename = "requesterEmail")]
    pub requester_email: Option<String>,
    /// Quantity of the asset assigned by this ticket (0 when unreported)
    #[serde(rename = "assetQuantity")]
    pub quantity: i64,
}

/// Durable record of the last-observed quantity for one
/// (domain, asset, ticket) tuple.
///
/// Unique per key; overwritten, never accumulated, on re-observation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuantityRecord {
    /// Helpdesk domain the record belongs to (partition key)
    pub domain: String,
    /// Composite sort key, see [`QuantityRecord::sort_key`]
    #[serde(rename = "assetId")]
    pub sort_key: String,
    /// Asset display id
    #[serde(rename = "assetNo")]
    pub asset_id: u64,
    /// Ticket id
    #[serde(rename = "ticketId")]
    pub ticket_id: u64,
    /// Snapshot of the assignment as last observed
    #[serde(rename = "ticketData")]
    pub assignment: AssetAssignment,
    /// First-observation timestamp
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    /// Last-observation timestamp
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl QuantityRecord {
    /// Composite sort key for a (asset, ticket) pair within a domain.
    pub fn sort_key(asset_id: u64, ticket_id: u64) -> String {
        format!("A#{asset_id}#T{ticket_id}")
    }

    /// Create a fresh record for a first observation.
    pub fn new(domain: &str, asset_id: u64, ticket_id: u64, assignment: AssetAssignment) -> Self {
        let now = Utc::now();
        Self {
            domain: domain.to_string(),
            sort_key: Self::sort_key(asset_id, ticket_id),
            asset_id,
            ticket_id,
            assignment,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Durable running total of assigned quantity per (domain, asset).
///
/// Invariant: equals the sum of the most-recently-observed quantity over all
/// tickets ever observed for the asset, assuming no external mutation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AggregateRecord {
    /// Helpdesk domain the record belongs to (partition key)
    pub domain: String,
    /// Asset display id (sort key)
    #[serde(rename = "assetId")]
    pub asset_id: u64,
    /// Sum of deltas applied over time; may go down when tickets reduce
    /// their reported quantity
    pub count: i64,
}
