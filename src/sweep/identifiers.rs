//! Service-request identifier extraction
//!
//! Association listings mix several identifier shapes (`SR-101`, `INC-5`).
//! Only service requests of the form `SR-<number>` participate in asset
//! reconciliation; everything else is filtered out, not errored. Duplicates
//! are preserved; callers own uniqueness if they need it.

use serde_json::Value;

/// Prefix marking a service-request identifier.
const SERVICE_REQUEST_PREFIX: &str = "SR-";

/// Extract and normalize service-request ids from raw identifier strings.
///
/// Order is preserved. Entries that do not match `SR-<number>` are dropped.
pub fn service_request_ids<'a, I>(raw: I) -> Vec<u64>
where
    I: IntoIterator<Item = &'a str>,
{
    raw.into_iter()
        .filter_map(|id| id.strip_prefix(SERVICE_REQUEST_PREFIX))
        .filter_map(|digits| digits.parse::<u64>().ok())
        .collect()
}

/// Extract service-request ids from a page of association records.
///
/// Each record is expected to carry a string `request_id`; records without
/// one are skipped.
pub fn ids_from_requests(requests: &[Value]) -> Vec<u64> {
    service_request_ids(
        requests
            .iter()
            .filter_map(|request| request.get("request_id").and_then(Value::as_str)),
    )
}
