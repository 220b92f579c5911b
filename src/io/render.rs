//! Renderers for dashboard frames

use crate::domain::record::{F1, PERCENT_ANOMALOUS, THRESHOLD, TOTAL_NORMAL};
use crate::services::poller::{DashboardFrame, Freshness, Renderer};
use tokio::sync::watch;
use tracing::{info, warn};

/// One structured log line per frame (headless dashboard)
#[derive(Debug, Default)]
pub struct LogRenderer;

impl Renderer for LogRenderer {
    fn render(&mut self, frame: &DashboardFrame) {
        let record = &frame.record;
        let latest_f1 = record.series(F1).last().copied();

        match &frame.freshness {
            Freshness::Fresh => info!(
                tick = %frame.tick,
                scanned = %record.scanned(),
                anomalies = %record.anomalies(),
                total_normal = ?record.count(TOTAL_NORMAL),
                percent_anomalous = ?record.number(PERCENT_ANOMALOUS),
                fps = %record.fps(),
                threshold = ?record.number(THRESHOLD),
                f1 = ?latest_f1,
                "dashboard_frame"
            ),
            Freshness::Stale { reason } => warn!(
                tick = %frame.tick,
                state = "stale",
                reason = %reason,
                last_success = ?frame.last_success,
                scanned = %record.scanned(),
                anomalies = %record.anomalies(),
                "dashboard_frame"
            ),
            Freshness::Baseline { reason } => warn!(
                tick = %frame.tick,
                state = "baseline",
                reason = %reason,
                last_success = ?frame.last_success,
                scanned = %record.scanned(),
                anomalies = %record.anomalies(),
                "dashboard_frame"
            ),
        }
    }
}

/// Publishes the latest frame to a watch channel for a UI thread
pub struct ChannelRenderer {
    tx: watch::Sender<Option<DashboardFrame>>,
}

impl ChannelRenderer {
    pub fn new() -> (Self, watch::Receiver<Option<DashboardFrame>>) {
        let (tx, rx) = watch::channel(None);
        (Self { tx }, rx)
    }
}

impl Renderer for ChannelRenderer {
    fn render(&mut self, frame: &DashboardFrame) {
        // UI gone means shutdown is underway
        let _ = self.tx.send(Some(frame.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::record::MetricRecord;
    use chrono::Utc;

    fn frame(tick: u64, freshness: Freshness) -> DashboardFrame {
        DashboardFrame {
            tick,
            record: MetricRecord::baseline().with_derived(0.5),
            freshness,
            rendered_at: Utc::now(),
            last_success: None,
        }
    }

    #[test]
    fn test_channel_renderer_keeps_latest() {
        let (mut renderer, rx) = ChannelRenderer::new();
        assert!(rx.borrow().is_none());

        renderer.render(&frame(1, Freshness::Fresh));
        renderer.render(&frame(2, Freshness::Stale { reason: "timeout".into() }));

        let latest = rx.borrow().clone().unwrap();
        assert_eq!(latest.tick, 2);
        assert_eq!(latest.freshness.reason(), Some("timeout"));
    }

    #[test]
    fn test_log_renderer_handles_every_state() {
        let mut renderer = LogRenderer;
        renderer.render(&frame(1, Freshness::Fresh));
        renderer.render(&frame(2, Freshness::Stale { reason: "refused".into() }));
        renderer.render(&frame(3, Freshness::Baseline { reason: "refused".into() }));
    }
}
