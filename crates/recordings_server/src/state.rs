use std::sync::Arc;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusHandle;
use recordings_core::ScanClient;
use recordings_core::presign::LinkPresigner;

pub const DEFAULT_PAGE_LIMIT: u32 = 50;
pub const DEFAULT_LINK_TTL: Duration = Duration::from_secs(3600);

/// Shared by every request handler.
pub struct AppState {
    pub scanner: Arc<dyn ScanClient>,
    /// `None` disables download links.
    pub presigner: Option<Arc<dyn LinkPresigner>>,
    pub table: String,
    pub default_limit: u32,
    pub link_ttl: Duration,
    /// `None` when no Prometheus recorder is installed (tests).
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(scanner: Arc<dyn ScanClient>, table: impl Into<String>) -> Self {
        Self {
            scanner,
            presigner: None,
            table: table.into(),
            default_limit: DEFAULT_PAGE_LIMIT,
            link_ttl: DEFAULT_LINK_TTL,
            metrics: None,
        }
    }

    pub fn with_presigner(mut self, presigner: Arc<dyn LinkPresigner>) -> Self {
        self.presigner = Some(presigner);
        self
    }

    pub fn with_default_limit(mut self, limit: u32) -> Self {
        self.default_limit = limit;
        self
    }

    pub fn with_link_ttl(mut self, ttl: Duration) -> Self {
        self.link_ttl = ttl;
        self
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}
