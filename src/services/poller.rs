//! Dashboard poller - periodic fetch with last-known-good fallback
//!
//! Each tick performs one bounded round trip to the query endpoint and
//! renders exactly one frame. A failed fetch never reaches the renderer as
//! an error: the poller substitutes the last record it fetched successfully
//! (or the baseline record if none) and keeps ticking on the same schedule.
//!
//! Ticks never overlap: a tick awaits its own response before the next one
//! is scheduled, so frames are rendered in tick order.

use crate::domain::record::MetricRecord;
use crate::io::client::TransportError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Where the poller reads records from
#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn fetch(&self) -> Result<MetricRecord, TransportError>;
}

/// Presentation layer fed by the poller
pub trait Renderer: Send {
    fn render(&mut self, frame: &DashboardFrame);
}

/// How current a rendered record is
#[derive(Debug, Clone, PartialEq)]
pub enum Freshness {
    /// Fetched on this tick
    Fresh,
    /// Fetch failed; showing the last successful fetch
    Stale { reason: String },
    /// Fetch failed and nothing was ever fetched; showing the baseline
    Baseline { reason: String },
}

impl Freshness {
    pub fn is_fresh(&self) -> bool {
        matches!(self, Freshness::Fresh)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Freshness::Fresh => None,
            Freshness::Stale { reason } | Freshness::Baseline { reason } => Some(reason),
        }
    }
}

/// One rendered dashboard state
#[derive(Debug, Clone)]
pub struct DashboardFrame {
    /// Tick sequence number, starting at 1
    pub tick: u64,
    /// Record with derived fields filled in
    pub record: MetricRecord,
    pub freshness: Freshness,
    pub rendered_at: DateTime<Utc>,
    /// When the shown data was last fetched successfully
    pub last_success: Option<DateTime<Utc>>,
}

/// Result of one fetch after the fallback rule was applied
#[derive(Debug)]
pub enum PollOutcome {
    Fresh(MetricRecord),
    Fallback { record: MetricRecord, reason: TransportError, had_success: bool },
}

impl PollOutcome {
    pub fn record(&self) -> &MetricRecord {
        match self {
            PollOutcome::Fresh(record) => record,
            PollOutcome::Fallback { record, .. } => record,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PollerSettings {
    pub interval: Duration,
    pub default_threshold: f64,
}

pub struct DashboardPoller<S, R> {
    source: S,
    renderer: R,
    settings: PollerSettings,
    /// Last successfully fetched record (client-side fallback cache)
    last_good: Option<MetricRecord>,
    last_success: Option<DateTime<Utc>>,
    tick: u64,
    fresh_count: u64,
    fallback_count: u64,
}

impl<S: MetricsSource, R: Renderer> DashboardPoller<S, R> {
    pub fn new(source: S, renderer: R, settings: PollerSettings) -> Self {
        Self {
            source,
            renderer,
            settings,
            last_good: None,
            last_success: None,
            tick: 0,
            fresh_count: 0,
            fallback_count: 0,
        }
    }

    /// Apply the fallback rule to a fetch result
    pub fn resolve(&mut self, result: Result<MetricRecord, TransportError>) -> PollOutcome {
        match result {
            Ok(record) => {
                self.last_good = Some(record.clone());
                self.last_success = Some(Utc::now());
                self.fresh_count += 1;
                PollOutcome::Fresh(record)
            }
            Err(reason) => {
                self.fallback_count += 1;
                let had_success = self.last_good.is_some();
                let record = self.last_good.clone().unwrap_or_else(MetricRecord::baseline);
                PollOutcome::Fallback { record, reason, had_success }
            }
        }
    }

    fn frame(&self, outcome: PollOutcome) -> DashboardFrame {
        let (record, freshness) = match outcome {
            PollOutcome::Fresh(record) => (record, Freshness::Fresh),
            PollOutcome::Fallback { record, reason, had_success: true } => {
                (record, Freshness::Stale { reason: reason.to_string() })
            }
            PollOutcome::Fallback { record, reason, had_success: false } => {
                (record, Freshness::Baseline { reason: reason.to_string() })
            }
        };

        DashboardFrame {
            tick: self.tick,
            record: record.with_derived(self.settings.default_threshold),
            freshness,
            rendered_at: Utc::now(),
            last_success: self.last_success,
        }
    }

    /// Fetch once, apply the fallback rule and render
    pub async fn poll_once(&mut self) -> DashboardFrame {
        self.tick += 1;
        let result = self.source.fetch().await;

        match &result {
            Ok(_) => debug!(tick = %self.tick, "poll_fresh"),
            Err(e) => warn!(tick = %self.tick, error = %e, "poll_fallback"),
        }

        let outcome = self.resolve(result);
        let frame = self.frame(outcome);
        self.renderer.render(&frame);
        frame
    }

    /// Tick until shutdown is signalled.
    ///
    /// A request in flight when shutdown arrives is dropped; otherwise it is
    /// bounded by the source's own timeout.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> PollerStats {
        let mut interval = tokio::time::interval(self.settings.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_ms = %self.settings.interval.as_millis(), "poller_started");

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = interval.tick() => {
                    tokio::select! {
                        _ = self.poll_once() => {}
                        changed = shutdown.changed() => {
                            if changed.is_err() || *shutdown.borrow() {
                                break;
                            }
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

        let stats = self.stats();
        info!(
            ticks = %stats.ticks,
            fresh = %stats.fresh,
            fallback = %stats.fallback,
            "poller_stopped"
        );
        stats
    }

    pub fn stats(&self) -> PollerStats {
        PollerStats { ticks: self.tick, fresh: self.fresh_count, fallback: self.fallback_count }
    }

    pub fn last_good(&self) -> Option<&MetricRecord> {
        self.last_good.as_ref()
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerStats {
    pub ticks: u64,
    pub fresh: u64,
    pub fallback: u64,
}
