use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusBuilder;
use recordings_core::config::Config;
use recordings_core::dynamo::DynamoScanClient;
use recordings_core::presign::S3Presigner;
use recordings_server::{
    AppState, InstrumentedScanClient, request_timeout, resolve_log_filter, router,
};
use tokio::signal;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let log_env = resolve_log_filter(|key| std::env::var(key).ok());
    let env_filter = tracing_subscriber::EnvFilter::try_new(&log_env)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .compact()
        .with_ansi(false)
        .with_target(false)
        .with_env_filter(env_filter)
        .init();
    info!(%log_env, "recordings_server: log filter");

    let handle = PrometheusBuilder::new().install_recorder()?;

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration; aborting startup");
            std::process::exit(1);
        }
    };

    let scanner = DynamoScanClient::from_config(&config)?;
    let mut state = AppState::new(
        Arc::new(InstrumentedScanClient::new(scanner)),
        config.table_name.clone(),
    )
    .with_default_limit(config.default_page_limit)
    .with_link_ttl(config.presign_ttl)
    .with_metrics(handle);

    match S3Presigner::from_config(&config) {
        Some(presigner) => state = state.with_presigner(Arc::new(presigner)),
        None => info!("RECORDINGS_BUCKET not set; download links disabled"),
    }

    let app = router(Arc::new(state)).layer(request_timeout(config.request_timeout));

    info!(
        addr = %config.address,
        table = %config.table_name,
        endpoint = %config.dynamodb_endpoint,
        "starting HTTP server"
    );
    let listener = match tokio::net::TcpListener::bind(config.address).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!("Failed to bind to address {}: {e}", config.address);
            std::process::exit(1);
        }
    };

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(e) = signal::ctrl_c().await {
                tracing::error!("failed to listen for ctrl+c: {e}");
            }
        })
        .await?;

    Ok(())
}
