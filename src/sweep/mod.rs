//! Sweep primitives
//!
//! The building blocks for walking the upstream API:
//!
//! - [`cursor::Cursor`] - resumption token for interrupted sweeps
//! - [`identifiers`] - service-request id extraction and normalization
//! - [`pagination::Paginator`] - full multi-page sweeps
//! - [`batch`] - fixed-size concurrent detail fetches with rate-limit
//!   early exit

use crate::client::ApiError;

pub mod batch;
pub mod cursor;
pub mod identifiers;
pub mod pagination;

pub use cursor::Cursor;

/// Sweep errors
#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    /// Upstream API error
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// The pagination guard tripped; the server never produced a short page
    #[error("pagination exceeded {max_iterations} iterations at {endpoint}")]
    PageLimitExceeded {
        /// Endpoint being paged
        endpoint: String,
        /// Configured iteration bound
        max_iterations: usize,
    },

    /// A blocking sweep was rate limited in a mode that cannot wait
    #[error("rate limited; retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds to wait before re-invoking
        retry_after_secs: u64,
    },
}

/// Result type for sweep operations
pub type SweepResult<T> = Result<T, SweepError>;
