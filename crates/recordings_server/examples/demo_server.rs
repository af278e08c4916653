//! The search API over a small in-memory table, for poking at locally.

use std::net::SocketAddr;
use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusBuilder;
use recordings_core::memory::InMemoryScanClient;
use recordings_server::{AppState, InstrumentedScanClient, router};
use serde_json::json;
use tokio::signal;

const TABLE: &str = "recordings";

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let log_env = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_new(&log_env)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let handle = PrometheusBuilder::new().install_recorder()?;

    let scanner = InMemoryScanClient::new("id");
    scanner
        .insert_all(
            TABLE,
            (1..=40).map(|i| {
                let dnis_code = if i % 3 == 0 { "1800" } else { "1300" };
                json!({
                    "id": format!("rec-{i:03}"),
                    "ani": format!("04120{i:05}"),
                    "dnis_code": dnis_code,
                    "local_start_time": format!("2019-01-{:02} {:02}:15:00.000", 1 + i % 28, 8 + i % 10),
                    "local_end_time": format!("2019-01-{:02} {:02}:45:00.000", 1 + i % 28, 8 + i % 10),
                    "filepath": format!("https://cdn.example.com/calls/rec-{i:03}.wav"),
                })
            }),
        )
        .await;

    let state = AppState::new(Arc::new(InstrumentedScanClient::new(scanner)), TABLE)
        .with_default_limit(10)
        .with_metrics(handle);

    let addr: SocketAddr = std::env::var("ADDRESS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 3000)));
    tracing::info!(%addr, "starting demo server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(Arc::new(state)).into_make_service())
        .with_graceful_shutdown(async {
            signal::ctrl_c().await.ok();
        })
        .await?;
    Ok(())
}
