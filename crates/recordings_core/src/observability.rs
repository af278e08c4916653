//! Metric names and recording helpers.
//!
//! Recording goes through the `metrics` facade, so nothing is collected until
//! the binary installs a recorder.

use std::time::Duration;

use crate::filter::FilterExpression;

pub const SEARCH_REQUESTS: &str = "recordings_search_requests_total";
pub const COUNT_REQUESTS: &str = "recordings_count_requests_total";
pub const FILTER_FRAGMENTS: &str = "recordings_filter_fragments_total";
pub const NORMALIZATION_OUTCOMES: &str = "recordings_date_normalization_total";
pub const SCAN_CALLS: &str = "recordings_scan_calls_total";
pub const SCAN_DURATION: &str = "recordings_scan_duration_seconds";
pub const PRESIGN_FAILURES: &str = "recordings_presign_failures_total";

/// Which way a raw date fragment went through the normalizer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NormalizationOutcome {
    /// Already canonical, passed through.
    Canonical,
    /// Parsed by one of the matchers.
    Parsed,
    /// Not understood; used verbatim.
    Verbatim,
}

impl NormalizationOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            NormalizationOutcome::Canonical => "canonical",
            NormalizationOutcome::Parsed => "parsed",
            NormalizationOutcome::Verbatim => "verbatim",
        }
    }
}

pub fn record_normalization(outcome: NormalizationOutcome) {
    metrics::counter!(NORMALIZATION_OUTCOMES, "outcome" => outcome.as_str()).increment(1);
}

/// One counter tick per fragment, labelled by attribute and match mode.
pub fn record_filter(filter: &FilterExpression) {
    for fragment in filter.fragments() {
        metrics::counter!(
            FILTER_FRAGMENTS,
            "field" => fragment.field().to_string(),
            "mode" => fragment.mode().as_str()
        )
        .increment(1);
    }
}

pub fn record_scan(operation: &'static str, elapsed: Duration, ok: bool) {
    let status = if ok { "ok" } else { "error" };
    metrics::counter!(SCAN_CALLS, "operation" => operation, "status" => status).increment(1);
    metrics::histogram!(SCAN_DURATION, "operation" => operation).record(elapsed.as_secs_f64());
}

pub fn record_search() {
    metrics::counter!(SEARCH_REQUESTS).increment(1);
}

pub fn record_count() {
    metrics::counter!(COUNT_REQUESTS).increment(1);
}

pub fn record_presign_failure() {
    metrics::counter!(PRESIGN_FAILURES).increment(1);
}
