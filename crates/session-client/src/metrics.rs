//! Refresh and retry counters
//!
//! - `session_refresh_total` (counter): label `outcome` (`success`, `failure`, `abandoned`)
//! - `session_refresh_queued_total` (counter): callers that waited on an in-flight refresh
//! - `session_request_retries_total` (counter): requests re-issued after a refresh
//!
//! Without an installed recorder these are no-ops.

/// Record a settled refresh.
pub fn record_refresh(outcome: &'static str) {
    metrics::counter!("session_refresh_total", "outcome" => outcome).increment(1);
}

/// Record a caller queued behind an in-flight refresh.
pub fn record_queued() {
    metrics::counter!("session_refresh_queued_total").increment(1);
}

/// Record a request re-issued with a refreshed token.
pub fn record_retry() {
    metrics::counter!("session_request_retries_total").increment(1);
}
