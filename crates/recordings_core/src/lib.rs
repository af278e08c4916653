//! Date normalization, filter construction and the paginated-scan contract
//! behind the recordings search.
//!
//! The pure core lives in [`datetime`] and [`filter`]. Everything else is the
//! plumbing that carries a built [`filter::FilterExpression`] to a
//! [`ScanClient`] and back.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub mod config;
pub mod cursor;
pub mod datetime;
pub mod dynamo;
pub mod filter;
pub mod memory;
pub mod observability;
pub mod paging;
pub mod presign;
pub mod retry;
pub mod sigv4;

pub use datetime::{normalize_date_time, normalize_optional};
pub use filter::{
    FilterExpression, FilterFragment, MatchMode, build_date_filter_fragment,
    build_text_filter_fragment,
};

#[derive(Debug, Error)]
pub enum RecordingsError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("scan service error ({status} {kind}): {message}")]
    Service {
        status: u16,
        kind: String,
        message: String,
    },
    #[error("scan throttled: {0}")]
    Throttled(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("invalid cursor: {0}")]
    InvalidCursor(String),
}

impl RecordingsError {
    /// Throttling, transport failures and 5xx responses are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            RecordingsError::Throttled(_) => true,
            RecordingsError::Http(e) => e.is_timeout() || e.is_connect(),
            RecordingsError::Service { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// A stored recording: a flat JSON object keyed by attribute name.
pub type Record = serde_json::Map<String, Value>;

/// One call to the filtered-scan service.
#[derive(Clone, Debug, PartialEq)]
pub struct ScanRequest {
    pub table: String,
    pub limit: u32,
    pub exclusive_start_key: Option<Value>,
    pub filter: FilterExpression,
}

impl ScanRequest {
    pub fn new(table: impl Into<String>, limit: u32) -> Self {
        Self {
            table: table.into(),
            limit,
            exclusive_start_key: None,
            filter: FilterExpression::default(),
        }
    }

    pub fn with_filter(mut self, filter: FilterExpression) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_start_key(mut self, key: Option<Value>) -> Self {
        self.exclusive_start_key = key;
        self
    }
}

/// A page of matching records plus the opaque continuation cursor.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScanPage {
    pub items: Vec<Record>,
    pub last_evaluated_key: Option<Value>,
    pub count: u64,
    pub scanned_count: u64,
}

impl ScanPage {
    pub fn has_more(&self) -> bool {
        self.last_evaluated_key.is_some()
    }
}

/// The paginated filtered-scan collaborator.
///
/// Consistency, page-size caps and cursor format are owned by the
/// implementation; callers only thread `last_evaluated_key` back in.
#[async_trait]
pub trait ScanClient: Send + Sync + 'static {
    async fn scan_page(&self, request: &ScanRequest) -> Result<ScanPage, RecordingsError>;

    /// Count every record in `table` matching `filter`, walking all pages.
    async fn count_matching(
        &self,
        table: &str,
        filter: &FilterExpression,
    ) -> Result<u64, RecordingsError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scan_request_builder_sets_fields() {
        let req = ScanRequest::new("recordings", 25)
            .with_start_key(Some(json!({"id": "r1"})))
            .with_filter(FilterExpression::new().with(build_text_filter_fragment(
                "ani",
                "ani",
                "0412",
            )));
        assert_eq!(req.table, "recordings");
        assert_eq!(req.limit, 25);
        assert_eq!(req.exclusive_start_key, Some(json!({"id": "r1"})));
        assert_eq!(req.filter.len(), 1);
    }

    #[test]
    fn retryable_classification() {
        assert!(RecordingsError::Throttled("slow down".into()).is_retryable());
        assert!(
            RecordingsError::Service {
                status: 503,
                kind: "ServiceUnavailable".into(),
                message: String::new(),
            }
            .is_retryable()
        );
        assert!(
            !RecordingsError::Service {
                status: 400,
                kind: "ValidationException".into(),
                message: String::new(),
            }
            .is_retryable()
        );
        assert!(!RecordingsError::InvalidCursor("x".into()).is_retryable());
    }
}
