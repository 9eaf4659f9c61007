use anyhow::{Context, Result};
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use tracing::info;

/// Install the global Prometheus recorder.
/// Returns a handle that can be used to render metrics for scraping
pub fn init_metrics() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        // Cycle cost is dominated by the HTTP call; buckets span 100ms to the default 10min interval
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Full("ingest.cycle_duration_seconds".to_string()),
            &[0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0],
        )
        .context("Failed to set buckets for ingest.cycle_duration_seconds")?
        .install_recorder()
        .context("Failed to install Prometheus recorder")
}

/// Initialize ingest metrics to zero/default values
/// This ensures metrics always appear in Prometheus queries even if no events have occurred
pub fn initialize_ingest_metrics() {
    metrics::counter!("ingest.fetch_attempts_total").absolute(0);
    metrics::counter!("ingest.fetch_failures_total").absolute(0);
    metrics::counter!("ingest.records_written_total").absolute(0);
    metrics::counter!("ingest.records_duplicate_total").absolute(0);
    for outcome in ["ingested", "skipped", "failed"] {
        metrics::counter!("ingest.cycles_total", "outcome" => outcome).absolute(0);
    }
}

/// Serve `/metrics` on the given port until the process exits.
///
/// The recorder must already be installed with [`init_metrics`].
pub async fn start_metrics_server(handle: PrometheusHandle, port: u16) -> Result<()> {
    let app = Router::new().route(
        "/metrics",
        get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting metrics server on http://{}/metrics", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind metrics server to {}", addr))?;

    axum::serve(listener, app)
        .await
        .context("Metrics server failed")
}
