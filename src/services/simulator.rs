//! Load generator - synthesizes metric records and pushes them to the relay

use crate::domain::record::{
    MetricRecord, MetricValue, ANOMALIES, EPOCHS, F1, FPS, PRECISION, RECALL, SCANNED,
};
use crate::io::client::TransportError;
use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

/// Evaluation rounds per synthesized record
pub const SIM_EPOCHS: usize = 5;

/// Where synthesized records are pushed
#[async_trait]
pub trait MetricsSink: Send + Sync {
    async fn push(&self, record: &MetricRecord) -> Result<MetricRecord, TransportError>;
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn score_series<R: Rng + ?Sized>(rng: &mut R, base: f64, span: f64) -> MetricValue {
    MetricValue::series((0..SIM_EPOCHS).map(|_| round2(base + rng.random::<f64>() * span)))
}

/// Random record within the documented ranges:
/// scanned 1000..=3000, anomalies 10..=60, fps [10, 20),
/// precision [0.6, 0.9), recall [0.5, 0.8), f1 [0.55, 0.85)
pub fn synthesize<R: Rng + ?Sized>(rng: &mut R) -> MetricRecord {
    let mut record = MetricRecord::new();
    record.insert(SCANNED, MetricValue::int(rng.random_range(1000..=3000)));
    record.insert(ANOMALIES, MetricValue::int(rng.random_range(10..=60)));
    record.insert(FPS, MetricValue::float(round2(10.0 + rng.random::<f64>() * 10.0)));
    record.insert(EPOCHS, MetricValue::series((1..=SIM_EPOCHS as i64).collect::<Vec<_>>()));
    record.insert(PRECISION, score_series(rng, 0.6, 0.3));
    record.insert(RECALL, score_series(rng, 0.5, 0.3));
    record.insert(F1, score_series(rng, 0.55, 0.3));
    record
}

#[derive(Debug, Clone, Copy)]
pub struct SimulatorSettings {
    pub interval: Duration,
    /// Stop after this many pushes; run until shutdown when `None`
    pub iterations: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimulatorReport {
    pub sent: u64,
    pub failed: u64,
}

pub struct Simulator<S> {
    sink: S,
    settings: SimulatorSettings,
}

impl<S: MetricsSink> Simulator<S> {
    pub fn new(sink: S, settings: SimulatorSettings) -> Self {
        Self { sink, settings }
    }

    /// Push one synthesized record
    pub async fn step(&self) -> Result<MetricRecord, TransportError> {
        // ThreadRng is not Send; keep it out of the await
        let record = synthesize(&mut rand::rng());
        self.sink.push(&record).await
    }

    /// Push on a fixed period until the iteration budget or shutdown.
    ///
    /// Failed pushes are logged and counted; the loop keeps going.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> SimulatorReport {
        let mut report = SimulatorReport::default();
        let mut interval = tokio::time::interval(self.settings.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(
            interval_ms = %self.settings.interval.as_millis(),
            iterations = ?self.settings.iterations,
            "simulator_started"
        );

        loop {
            if let Some(limit) = self.settings.iterations {
                if report.sent + report.failed >= limit {
                    break;
                }
            }
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = interval.tick() => {
                    match self.step().await {
                        Ok(stored) => {
                            report.sent += 1;
                            info!(
                                scanned = %stored.scanned(),
                                anomalies = %stored.anomalies(),
                                fps = %stored.fps(),
                                "simulator_push_ok"
                            );
                        }
                        Err(e) => {
                            report.failed += 1;
                            warn!(error = %e, "simulator_push_failed");
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(sent = %report.sent, failed = %report.failed, "simulator_stopped");
        report
    }
}
