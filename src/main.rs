//! metrics-relay - live metrics relay server
//!
//! Holds the latest metrics record from producers and serves it to
//! dashboards over HTTP.
//!
//! Module structure:
//! - `domain/` - Metric record types and validation
//! - `io/` - HTTP server, HTTP client, renderers, Prometheus formatting
//! - `services/` - Store, ingest, query, dashboard poller, simulator
//! - `infra/` - Config, self-metrics, logging

use clap::Parser;
use metrics_relay::infra::config::DEFAULT_CONFIG_PATH;
use metrics_relay::infra::logging::init_tracing;
use metrics_relay::infra::{Config, RelayMetrics};
use metrics_relay::io::http::{bind, serve, AppState};
use metrics_relay::services::MetricStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

/// Live metrics relay server
#[derive(Parser, Debug)]
#[command(name = "metrics-relay", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, env = "CONFIG_FILE", default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Listening port (overrides config and PORT)
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_tracing("info");
    info!("metrics-relay starting");

    let args = Args::parse();

    let mut config = Config::load_from_path(&args.config);
    if let Some(port) = args.port {
        config = config.with_port(port);
    }

    info!(
        config_file = %config.config_file(),
        bind_address = %config.bind_address(),
        port = %config.port(),
        request_timeout_ms = %config.server_request_timeout_ms(),
        max_body_bytes = %config.max_body_bytes(),
        default_threshold = %config.default_threshold(),
        stats_interval_secs = %config.stats_interval_secs(),
        "config_loaded"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let store = Arc::new(MetricStore::with_baseline());
    let metrics = Arc::new(RelayMetrics::new());
    let state = Arc::new(AppState::from_config(store, metrics.clone(), &config));

    // Periodic self-metrics log line (disabled when interval is 0)
    let stats_interval = config.stats_interval_secs();
    if stats_interval > 0 {
        let metrics = metrics.clone();
        let mut stats_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(stats_interval));
            // First tick fires immediately
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => metrics.report().log(),
                    _ = stats_shutdown.changed() => break,
                }
            }
        });
    }

    // Handle shutdown on Ctrl+C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    // Fail startup if the port is taken
    let listener = bind(config.bind_address(), config.port()).await?;
    serve(listener, state, shutdown_rx).await?;

    metrics.report().log();
    info!("metrics-relay shutdown complete");
    Ok(())
}
