//! Sync configuration constants

/// Default maximum attempts for interactive API calls.
/// 5 attempts keeps a request-scoped operation bounded to roughly half a
/// minute of cumulative waiting under the fallback schedule.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Maximum attempts for background sweeps.
/// Full-sweep pagination is allowed to wait out rate-limit windows; 15
/// attempts tolerates sustained throttling without looping forever.
pub const SWEEP_MAX_ATTEMPTS: u32 = 15;

/// Per-attempt fallback wait in seconds when a 429 response carries no
/// `retry-after` header. Scaled linearly by the attempt number so repeated
/// throttling backs off progressively.
pub const RETRY_AFTER_FALLBACK_SECS: u64 = 2;

/// Page size for asset association listings.
pub const ASSOCIATION_PAGE_SIZE: usize = 10;

/// Number of detail fetches issued concurrently per batch.
/// Matches the association page size so one page is one batch.
pub const DETAIL_BATCH_SIZE: usize = 10;

/// Page size for asset listings during a full scan.
pub const ASSET_PAGE_SIZE: usize = 30;

/// Page size for association and asset-type listings during a full scan.
pub const SCAN_PAGE_SIZE: usize = 100;

/// Maximum number of pagination iterations to prevent infinite loops when a
/// server keeps returning full pages.
pub const MAX_PAGINATION_ITERATIONS: usize = 10_000;

/// Fallback wait for a rate-limited attempt without a `retry-after` header.
///
/// The attempt counter is 1-indexed: the first rate-limited attempt waits
/// `RETRY_AFTER_FALLBACK_SECS`, the second twice that, and so on.
pub fn fallback_retry_after(attempt: u32) -> u64 {
    u64::from(attempt) * RETRY_AFTER_FALLBACK_SECS
}
