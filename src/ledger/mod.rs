//! Quantity ledger
//!
//! Reconciles newly observed ticket quantities against previously stored
//! snapshots so that repeated observations of the same ticket never
//! double-count. Each (domain, asset, ticket) tuple stores the quantity as
//! last reported; the (domain, asset) aggregate moves by the delta between
//! observations, so decreases subtract correctly.
//!
//! The quantity record and the aggregate record are two independent writes
//! with no cross-key atomicity; what this layer does guarantee is that the
//! read-modify-write of any one aggregate is serialized in-process by a
//! per-(domain, asset) async mutex, so concurrent batch workers cannot lose
//! updates to the same aggregate.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::store::{
    DocumentStore, RecordKey, StoreError, AGGREGATES_COLLECTION, ASSIGNMENTS_COLLECTION,
};
use crate::{AggregateRecord, AssetAssignment, QuantityRecord};

/// Ledger errors
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// The document store failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Outcome of one reconciliation: the delta applied and the aggregate it
/// produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciliation {
    /// Observed quantity minus the previously stored snapshot (the full
    /// observed quantity on first observation); negative when a ticket's
    /// quantity decreased
    pub delta: i64,
    /// Aggregate count for the (domain, asset) after applying the delta
    pub new_aggregate: i64,
}

type AggregateKey = (String, u64);

/// Delta-reconciling ledger over a document store.
pub struct QuantityLedger {
    store: Arc<dyn DocumentStore>,
    locks: DashMap<AggregateKey, Arc<Mutex<()>>>,
    assignments_collection: String,
    aggregates_collection: String,
}

impl QuantityLedger {
    /// Create a ledger over the given store with default collection names.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            locks: DashMap::new(),
            assignments_collection: ASSIGNMENTS_COLLECTION.to_string(),
            aggregates_collection: AGGREGATES_COLLECTION.to_string(),
        }
    }

    /// Override the collection names.
    pub fn with_collections(
        mut self,
        assignments: impl Into<String>,
        aggregates: impl Into<String>,
    ) -> Self {
        self.assignments_collection = assignments.into();
        self.aggregates_collection = aggregates.into();
        self
    }

    /// Reconcile a newly observed quantity for (domain, asset, ticket).
    ///
    /// First observation contributes the full quantity; a re-observation
    /// contributes the difference from the stored snapshot and overwrites
    /// it. The matching aggregate moves by that delta, treating a missing
    /// aggregate as a zero baseline.
    pub async fn reconcile(
        &self,
        domain: &str,
        asset_id: u64,
        ticket_id: u64,
        assignment: AssetAssignment,
    ) -> LedgerResult<Reconciliation> {
        let observed = assignment.quantity;
        let lock = self.aggregate_lock(domain, asset_id);
        let _guard = lock.lock().await;

        let previous = self.read_snapshot(domain, asset_id, ticket_id).await?;
        let delta = match &previous {
            Some(record) => observed - record.assignment.quantity,
            None => observed,
        };

        let record = match previous {
            Some(mut record) => {
                record.assignment = assignment;
                record.updated_at = chrono::Utc::now();
                record
            }
            None => QuantityRecord::new(domain, asset_id, ticket_id, assignment),
        };
        self.write_record(&self.assignments_collection, &record)
            .await?;

        let new_aggregate = match self.read_aggregate(domain, asset_id).await? {
            Some(aggregate) => aggregate.count + delta,
            None => delta,
        };
        self.write_record(
            &self.aggregates_collection,
            &AggregateRecord {
                domain: domain.to_string(),
                asset_id,
                count: new_aggregate,
            },
        )
        .await?;

        debug!(
            domain,
            asset_id, ticket_id, observed, delta, new_aggregate, "quantity reconciled"
        );

        Ok(Reconciliation {
            delta,
            new_aggregate,
        })
    }

    /// Overwrite the snapshot for (domain, asset, ticket) without touching
    /// the aggregate.
    ///
    /// Used by full scans, which recompute aggregates from scratch instead
    /// of applying deltas.
    pub async fn record_snapshot(
        &self,
        domain: &str,
        asset_id: u64,
        ticket_id: u64,
        assignment: AssetAssignment,
    ) -> LedgerResult<()> {
        let record = QuantityRecord::new(domain, asset_id, ticket_id, assignment);
        self.write_record(&self.assignments_collection, &record)
            .await
    }

    /// Set the aggregate for (domain, asset) to an absolute value.
    pub async fn set_aggregate(&self, domain: &str, asset_id: u64, count: i64) -> LedgerResult<()> {
        let lock = self.aggregate_lock(domain, asset_id);
        let _guard = lock.lock().await;
        self.write_record(
            &self.aggregates_collection,
            &AggregateRecord {
                domain: domain.to_string(),
                asset_id,
                count,
            },
        )
        .await
    }

    fn aggregate_lock(&self, domain: &str, asset_id: u64) -> Arc<Mutex<()>> {
        self.locks
            .entry((domain.to_string(), asset_id))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn read_snapshot(
        &self,
        domain: &str,
        asset_id: u64,
        ticket_id: u64,
    ) -> LedgerResult<Option<QuantityRecord>> {
        let key = RecordKey::new(domain, QuantityRecord::sort_key(asset_id, ticket_id));
        let value = self
            .store
            .read_one(&self.assignments_collection, &key)
            .await?;
        value
            .map(|value| parse_record(&self.assignments_collection, value))
            .transpose()
            .map_err(LedgerError::Store)
    }

    async fn read_aggregate(
        &self,
        domain: &str,
        asset_id: u64,
    ) -> LedgerResult<Option<AggregateRecord>> {
        let key = RecordKey::new(domain, asset_id.to_string());
        let value = self
            .store
            .read_one(&self.aggregates_collection, &key)
            .await?;
        value
            .map(|value| parse_record(&self.aggregates_collection, value))
            .transpose()
            .map_err(LedgerError::Store)
    }

    async fn write_record<T: serde::Serialize>(
        &self,
        collection: &str,
        record: &T,
    ) -> LedgerResult<()> {
        let value = serde_json::to_value(record).map_err(|e| StoreError::MalformedRecord {
            collection: collection.to_string(),
            reason: e.to_string(),
        })?;
        self.store.upsert(collection, value).await?;
        Ok(())
    }
}

fn parse_record<T: serde::de::DeserializeOwned>(
    collection: &str,
    value: Value,
) -> Result<T, StoreError> {
    serde_json::from_value(value).map_err(|e| StoreError::MalformedRecord {
        collection: collection.to_string(),
        reason: e.to_string(),
    })
}
