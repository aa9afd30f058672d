//! Concurrent batch fan-out with rate-limit early exit
//!
//! Detail fetches over a candidate id list run in contiguous fixed-size
//! chunks. Within a chunk every fetch is issued concurrently and all settle
//! before the next chunk starts; a chunk in flight always runs to
//! completion. An individual item's failure never aborts its siblings, it
//! is simply dropped from the results.
//!
//! When any settled result in a chunk reports a rate limit, no further
//! chunks are issued and the unprocessed ids are returned as a resumable
//! cursor together with the wait hint.

use std::future::Future;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::client::ApiResult;

/// Per-item fetch outcome, as classified by the caller's closure.
#[derive(Debug)]
pub enum ItemOutcome<T> {
    /// Fetched and shaped successfully
    Item(T),
    /// The upstream throttled this fetch
    RateLimited {
        /// Wait hint for the interruption
        retry_after_secs: u64,
    },
    /// Fetched but unusable (e.g., response missing expected fields);
    /// dropped without failing the batch
    Skipped,
}

/// Why a batch run stopped before exhausting the id list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interruption {
    /// Seconds the upstream asked us to wait
    pub retry_after_secs: u64,
    /// Ids from chunks that were never issued, in original order
    pub remaining_ids: Vec<u64>,
}

/// Result of a batch run: everything that settled successfully plus the
/// interruption point, if any.
#[derive(Debug)]
pub struct BatchOutcome<T> {
    /// Successfully fetched items, chunk order preserved
    pub results: Vec<T>,
    /// Present when a rate limit stopped the run early
    pub interruption: Option<Interruption>,
}

impl<T> BatchOutcome<T> {
    /// Whether the run covered every id.
    pub fn is_complete(&self) -> bool {
        self.interruption.is_none()
    }
}

/// Process `ids` in contiguous chunks of `batch_size`, fanning each chunk
/// out concurrently.
///
/// `per_item` performs one detail fetch. Its `Err` results are logged and
/// dropped (partial-failure tolerance); `ItemOutcome::RateLimited` marks
/// the run interrupted after the current chunk settles.
pub async fn process_batches<T, F, Fut>(
    ids: &[u64],
    batch_size: usize,
    per_item: F,
) -> BatchOutcome<T>
where
    F: Fn(u64) -> Fut,
    Fut: Future<Output = ApiResult<ItemOutcome<T>>>,
{
    let batch_size = batch_size.max(1);
    let mut results = Vec::new();
    let mut interruption = None;
    let mut consumed = 0usize;

    for chunk in ids.chunks(batch_size) {
        debug!(
            chunk_start = consumed,
            chunk_len = chunk.len(),
            "issuing detail fetch chunk"
        );
        let settled = join_all(chunk.iter().map(|&id| per_item(id))).await;
        consumed += chunk.len();

        let mut retry_after = None;
        for (&id, outcome) in chunk.iter().zip(settled) {
            match outcome {
                Ok(ItemOutcome::Item(item)) => results.push(item),
                Ok(ItemOutcome::RateLimited { retry_after_secs }) => {
                    // First signal in the chunk wins; siblings already
                    // settled and their items are kept.
                    retry_after.get_or_insert(retry_after_secs);
                }
                Ok(ItemOutcome::Skipped) => {
                    debug!(id, "detail fetch skipped");
                }
                Err(error) => {
                    warn!(id, error = %error, "detail fetch failed; dropping from batch");
                }
            }
        }

        if let Some(retry_after_secs) = retry_after {
            interruption = Some(Interruption {
                retry_after_secs,
                remaining_ids: ids[consumed..].to_vec(),
            });
            break;
        }
    }

    BatchOutcome {
        results,
        interruption,
    }
}
