//! Metrics simulator - pushes synthetic records to a running relay
//!
//! Usage:
//!   cargo run --bin metrics-sim -- --url http://127.0.0.1:8050/metrics --interval-secs 1
//!   cargo run --bin metrics-sim -- --count 10

use clap::Parser;
use metrics_relay::infra::config::DEFAULT_CONFIG_PATH;
use metrics_relay::infra::logging::init_tracing;
use metrics_relay::infra::Config;
use metrics_relay::io::HttpMetricsClient;
use metrics_relay::services::{Simulator, SimulatorSettings};
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "metrics-sim", version)]
#[command(about = "Push synthetic metric records to a metrics relay")]
struct Args {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE", default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Relay `/metrics` URL (overrides config)
    #[arg(long)]
    url: Option<String>,

    /// Seconds between pushes (overrides config)
    #[arg(long)]
    interval_secs: Option<u64>,

    /// Stop after this many pushes
    #[arg(long)]
    count: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_tracing("info");

    let args = Args::parse();
    let config = Config::load_from_path(&args.config);

    let url = args.url.unwrap_or_else(|| config.simulator_url().to_string());
    let interval_secs = args.interval_secs.unwrap_or(config.simulator_interval_secs()).max(1);
    let timeout = Duration::from_millis(config.dashboard_request_timeout_ms());

    info!(url = %url, interval_secs = %interval_secs, count = ?args.count, "simulator_config");

    let client = HttpMetricsClient::new(url, timeout)?;
    let settings =
        SimulatorSettings { interval: Duration::from_secs(interval_secs), iterations: args.count };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    let report = Simulator::new(client, settings).run(shutdown_rx).await;
    info!(sent = %report.sent, failed = %report.failed, "metrics-sim done");
    Ok(())
}
