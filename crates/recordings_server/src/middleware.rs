//! Logging and metrics around the scan collaborator.

use std::sync::Arc;
use std::time::Instant;

use recordings_core::observability::record_scan;
use recordings_core::{FilterExpression, RecordingsError, ScanClient, ScanPage, ScanRequest};
use tracing::debug;

/// Wraps a [`ScanClient`], timing every call and recording the outcome.
pub struct InstrumentedScanClient<C: ScanClient> {
    inner: Arc<C>,
}

impl<C: ScanClient> InstrumentedScanClient<C> {
    pub fn new(client: C) -> Self {
        Self {
            inner: Arc::new(client),
        }
    }

    async fn observed<F, Fut, T>(&self, name: &'static str, operation: F) -> Result<T, RecordingsError>
    where
        F: FnOnce(Arc<C>) -> Fut,
        Fut: std::future::Future<Output = Result<T, RecordingsError>>,
    {
        let start = Instant::now();
        let result = operation(self.inner.clone()).await;
        let elapsed = start.elapsed();
        record_scan(name, elapsed, result.is_ok());
        match &result {
            Ok(_) => debug!(operation = name, ?elapsed, "scan call finished"),
            Err(e) => debug!(operation = name, ?elapsed, error = %e, "scan call failed"),
        }
        result
    }
}

#[async_trait::async_trait]
impl<C: ScanClient> ScanClient for InstrumentedScanClient<C> {
    async fn scan_page(&self, request: &ScanRequest) -> Result<ScanPage, RecordingsError> {
        self.observed("scan_page", |client| async move { client.scan_page(request).await })
            .await
    }

    async fn count_matching(
        &self,
        table: &str,
        filter: &FilterExpression,
    ) -> Result<u64, RecordingsError> {
        self.observed("count_matching", |client| async move {
            client.count_matching(table, filter).await
        })
        .await
    }
}
