//! Document store collaborator interface
//!
//! The store itself (Cosmos, Dynamo, or anything key-addressable) lives
//! outside this crate. The sync logic only needs point reads and upserts
//! against (partition, sort)-keyed collections; no transaction or multi-key
//! atomicity is assumed available.

use async_trait::async_trait;
use serde_json::Value;

/// Default collection for per-(domain, asset, ticket) quantity records.
pub const ASSIGNMENTS_COLLECTION: &str = "asset_assignments";

/// Default collection for per-(domain, asset) aggregate counts.
pub const AGGREGATES_COLLECTION: &str = "asset_counts";

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store rejected or failed the operation
    #[error("store error: {0}")]
    Backend(String),

    /// A stored document did not match the expected record shape
    #[error("malformed record in {collection}: {reason}")]
    MalformedRecord {
        /// Collection the document came from
        collection: String,
        /// What failed to parse
        reason: String,
    },
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Lookup key for a document: domain partition plus a sort key within it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    /// Partition (helpdesk domain)
    pub domain: String,
    /// Sort key within the partition
    pub sort_key: String,
}

impl RecordKey {
    /// Build a key from domain and sort key.
    pub fn new(domain: impl Into<String>, sort_key: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            sort_key: sort_key.into(),
        }
    }
}

/// Narrow document-store seam consumed by the ledger and scan logic.
///
/// Implementations own persistence and conflict resolution; this crate only
/// computes the correct next value for each record.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Point-read one document, `None` when absent.
    async fn read_one(&self, collection: &str, key: &RecordKey) -> StoreResult<Option<Value>>;

    /// Insert or overwrite one document.
    async fn upsert(&self, collection: &str, value: Value) -> StoreResult<()>;
}
