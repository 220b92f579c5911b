//! Prometheus text exposition of relay self-metrics
//!
//! Served by the relay at `GET /stats`.

use crate::infra::metrics::{StatsSnapshot, METRICS_BUCKET_BOUNDS, METRICS_NUM_BUCKETS};
use std::fmt::Write;

/// Content type for the text exposition format
pub const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Prometheus metric type
enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

/// Write a simple metric (counter or gauge)
fn write_metric(output: &mut String, name: &str, help: &str, typ: MetricType, val: u64) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name} {val}");
}

/// Write a histogram metric with buckets, sum, and count
fn write_histogram(
    output: &mut String,
    name: &str,
    help: &str,
    buckets: &[u64; METRICS_NUM_BUCKETS],
    bounds: &[u64; 10],
    sum: u64,
) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} histogram");

    let mut cumulative = 0u64;
    for (i, &bound) in bounds.iter().enumerate() {
        cumulative += buckets[i];
        let _ = writeln!(output, "{name}_bucket{{le=\"{bound}\"}} {cumulative}");
    }
    cumulative += buckets[METRICS_NUM_BUCKETS - 1];
    let _ = writeln!(output, "{name}_bucket{{le=\"+Inf\"}} {cumulative}");

    let _ = writeln!(output, "{name}_sum {sum}");
    let _ = writeln!(output, "{name}_count {cumulative}");
}

/// Format a stats snapshot plus the current store revision
pub fn format_relay_stats(stats: &StatsSnapshot, store_revision: u64) -> String {
    let mut output = String::with_capacity(2048);

    write_metric(
        &mut output,
        "relay_ingest_accepted_total",
        "Pushes merged into the store",
        MetricType::Counter,
        stats.ingest_accepted,
    );
    write_metric(
        &mut output,
        "relay_ingest_rejected_total",
        "Pushes rejected by validation",
        MetricType::Counter,
        stats.ingest_rejected,
    );
    write_metric(
        &mut output,
        "relay_fields_dropped_total",
        "Unrecognized fields dropped from accepted pushes",
        MetricType::Counter,
        stats.fields_dropped,
    );
    write_metric(
        &mut output,
        "relay_queries_total",
        "Metric reads served",
        MetricType::Counter,
        stats.queries_served,
    );
    write_metric(
        &mut output,
        "relay_not_found_total",
        "Requests for unknown routes",
        MetricType::Counter,
        stats.not_found,
    );
    write_metric(
        &mut output,
        "relay_store_revision",
        "Number of merges that changed the stored record",
        MetricType::Gauge,
        store_revision,
    );

    write_histogram(
        &mut output,
        "relay_request_latency_us",
        "Request handling latency in microseconds",
        &stats.latency_buckets,
        &METRICS_BUCKET_BOUNDS,
        stats.latency_sum_us,
    );
    write_metric(
        &mut output,
        "relay_request_latency_p50_us",
        "50th percentile request latency",
        MetricType::Gauge,
        stats.latency_p50_us,
    );
    write_metric(
        &mut output,
        "relay_request_latency_p99_us",
        "99th percentile request latency",
        MetricType::Gauge,
        stats.latency_p99_us,
    );

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::metrics::RelayMetrics;

    #[test]
    fn test_format_relay_stats() {
        let metrics = RelayMetrics::new();
        metrics.record_ingest_accepted(2);
        metrics.record_ingest_rejected();
        metrics.record_query();
        metrics.record_request(150);
        metrics.record_request(90_000);

        let output = format_relay_stats(&metrics.snapshot(), 7);

        assert!(output.contains("relay_ingest_accepted_total 1"));
        assert!(output.contains("relay_ingest_rejected_total 1"));
        assert!(output.contains("relay_fields_dropped_total 2"));
        assert!(output.contains("relay_queries_total 1"));
        assert!(output.contains("relay_store_revision 7"));
        assert!(output.contains("# TYPE relay_request_latency_us histogram"));
        assert!(output.contains("relay_request_latency_us_bucket{le=\"100\"} 0"));
        assert!(output.contains("relay_request_latency_us_bucket{le=\"200\"} 1"));
        assert!(output.contains("relay_request_latency_us_bucket{le=\"+Inf\"} 2"));
        assert!(output.contains("relay_request_latency_us_sum 90150"));
        assert!(output.contains("relay_request_latency_us_count 2"));
    }

    #[test]
    fn test_empty_snapshot_formats_zeros() {
        let output = format_relay_stats(&RelayMetrics::new().snapshot(), 0);
        assert!(output.contains("relay_request_latency_p99_us 0"));
        assert!(output.contains("relay_request_latency_us_count 0"));
    }
}
