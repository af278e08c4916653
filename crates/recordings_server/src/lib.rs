//! HTTP surface for the recordings search.
//!
//! `GET /api/recordings` returns one page of matching recordings,
//! `GET /api/recordings/count` the total number of matches. Query parameters
//! are turned into a [`FilterExpression`] by [`build_search_filter`]; the
//! actual scanning is left to whatever [`recordings_core::ScanClient`] sits in
//! [`AppState`].

use std::sync::Arc;
use std::time::Duration;

use axum::debug_handler;
use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};
use futures_util::future::join_all;
use recordings_core::cursor::decode_cursor;
use recordings_core::observability;
use recordings_core::paging::{PageInfo, fetch_page};
use recordings_core::{
    FilterExpression, Record, ScanRequest, build_date_filter_fragment, build_text_filter_fragment,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::timeout::TimeoutLayer;
use tracing::{info, warn};

pub mod error;
pub mod middleware;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use middleware::InstrumentedScanClient;
pub use state::AppState;

pub const MAX_PAGE_LIMIT: u32 = 1000;

/// Query string accepted by both search endpoints. Everything arrives as
/// text so malformed numbers can fall back to defaults instead of failing.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct SearchParams {
    pub page: Option<String>,
    pub limit: Option<String>,
    pub ani: Option<String>,
    pub dnis_code: Option<String>,
    pub local_start_time: Option<String>,
    pub local_end_time: Option<String>,
    #[serde(rename = "lastKey")]
    pub last_key: Option<String>,
}

impl SearchParams {
    /// 1-based page number, 1 when absent or not a positive integer.
    pub fn page(&self) -> u32 {
        parse_positive(self.page.as_deref()).unwrap_or(1)
    }

    /// Page size, `default` when absent or not a positive integer, never
    /// above [`MAX_PAGE_LIMIT`].
    pub fn limit(&self, default: u32) -> u32 {
        parse_positive(self.limit.as_deref())
            .unwrap_or(default)
            .clamp(1, MAX_PAGE_LIMIT)
    }
}

fn parse_positive(raw: Option<&str>) -> Option<u32> {
    raw.and_then(|s| s.trim().parse::<u32>().ok()).filter(|n| *n > 0)
}

/// Caller and dialled numbers match anywhere in the stored value; start and
/// end times go through date normalization.
pub fn build_search_filter(params: &SearchParams) -> FilterExpression {
    let text = |field: &str, raw: &Option<String>| {
        raw.as_deref()
            .and_then(|v| build_text_filter_fragment(field, field, v))
    };
    let date = |field: &str, raw: &Option<String>| {
        raw.as_deref()
            .and_then(|v| build_date_filter_fragment(field, field, v))
    };

    let mut filter = FilterExpression::new();
    filter
        .push(text("ani", &params.ani))
        .push(text("dnis_code", &params.dnis_code))
        .push(date("local_start_time", &params.local_start_time))
        .push(date("local_end_time", &params.local_end_time));
    filter
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub recordings: Vec<Record>,
    pub pagination: PageInfo,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountResponse {
    pub total_count: u64,
}

#[debug_handler]
async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

#[debug_handler]
async fn metrics_endpoint(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            handle.render(),
        ),
        None => (
            StatusCode::NOT_FOUND,
            [("content-type", "text/plain")],
            "metrics recorder not installed".to_string(),
        ),
    }
}

#[debug_handler]
async fn list_recordings(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<SearchResponse>> {
    let page = params.page();
    let limit = params.limit(state.default_limit);
    let filter = build_search_filter(&params);
    observability::record_search();
    observability::record_filter(&filter);

    let start_key = params
        .last_key
        .as_deref()
        .filter(|token| !token.trim().is_empty())
        .and_then(|token| match decode_cursor(token) {
            Ok(key) => Some(key),
            Err(e) => {
                warn!(error = %e, "ignoring undecodable lastKey");
                None
            }
        });

    let request = ScanRequest::new(state.table.clone(), limit)
        .with_filter(filter)
        .with_start_key(start_key);
    let scanned = fetch_page(state.scanner.as_ref(), &request, page).await?;
    let pagination = PageInfo::new(page, limit, &scanned);
    let recordings = attach_download_links(&state, scanned.items).await;

    info!(
        page,
        limit,
        filters = request.filter.len(),
        returned = recordings.len(),
        has_more = pagination.has_more,
        "search recordings"
    );
    Ok(Json(SearchResponse {
        recordings,
        pagination,
    }))
}

#[debug_handler]
async fn count_recordings(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<CountResponse>> {
    let filter = build_search_filter(&params);
    observability::record_count();
    observability::record_filter(&filter);

    let total_count = state.scanner.count_matching(&state.table, &filter).await?;
    info!(filters = filter.len(), total_count, "count recordings");
    Ok(Json(CountResponse { total_count }))
}

/// Add `downloadUrl` to every record with a `filepath`, presigning
/// concurrently. A failed link leaves its record as it was.
pub async fn attach_download_links(state: &AppState, items: Vec<Record>) -> Vec<Record> {
    let Some(presigner) = &state.presigner else {
        return items;
    };
    let ttl = state.link_ttl;

    join_all(items.into_iter().map(|mut record| {
        let presigner = presigner.clone();
        async move {
            let Some(filepath) = record
                .get("filepath")
                .and_then(Value::as_str)
                .map(str::to_string)
            else {
                return record;
            };
            match presigner.presign(&filepath, ttl).await {
                Ok(Some(url)) => {
                    record.insert("downloadUrl".to_string(), Value::String(url));
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(%filepath, error = %e, "could not presign download link");
                    observability::record_presign_failure();
                }
            }
            record
        }
    }))
    .await
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .route("/api/recordings", get(list_recordings))
        .route("/api/recordings/count", get(count_recordings))
        .with_state(state)
}

/// Requests running longer than `timeout` are answered with 408.
pub fn request_timeout(timeout: Duration) -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, timeout)
}

/// Log filter directive: `RECORDINGS_LOG_LEVEL`, then `RUST_LOG`, then `info`.
pub fn resolve_log_filter<F>(get: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    ["RECORDINGS_LOG_LEVEL", "RUST_LOG"]
        .into_iter()
        .filter_map(|key| get(key))
        .find(|value| !value.trim().is_empty())
        .unwrap_or_else(|| "info".to_string())
}
