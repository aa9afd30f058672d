//! Resumption cursors for interrupted sweeps

use serde::{Deserialize, Serialize};

/// Opaque resumption token allowing an interrupted sweep to continue
/// without restarting.
///
/// A sweep is either positioned at a page that still needs listing, or at a
/// set of already-listed ids whose detail fetches remain. The two are
/// distinct states, not an overloaded optional list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cursor_type", rename_all = "snake_case")]
pub enum Cursor {
    /// Continue by listing this page of the association endpoint
    NextPage {
        /// 1-indexed page number
        page: u32,
    },
    /// Continue by fetching details for these already-listed ids; the
    /// listing fetch for `page` itself is skipped
    ResumeIds {
        /// Page the ids were listed from; the sweep prefetches `page + 1`
        /// after processing them
        page: u32,
        /// Unprocessed service-request ids, in listing order
        ids: Vec<u64>,
    },
}

impl Cursor {
    /// Cursor for a fresh sweep.
    pub fn first() -> Self {
        Cursor::NextPage { page: 1 }
    }

    /// Whether this cursor resumes with pre-listed ids.
    pub fn is_resume(&self) -> bool {
        matches!(self, Cursor::ResumeIds { .. })
    }
}
