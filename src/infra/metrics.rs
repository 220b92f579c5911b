//! Lock-free relay self-metrics and periodic reporting
//!
//! Uses atomics for hot-path operations to avoid mutex contention with the
//! request handlers. Counters and the latency histogram are cumulative so
//! `/stats` can be scraped at any time; `report()` additionally swaps a small
//! set of windowed counters to compute rates for the log line.
//!
//! All atomics are Relaxed: the counters are statistics only and must not
//! drive request handling or store decisions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Prometheus-style exponential bucket boundaries (microseconds)
/// Buckets: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200
const BUCKET_BOUNDS: [u64; 10] = [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200];
const NUM_BUCKETS: usize = 11;

/// Compute bucket index for a latency value using binary search
#[inline]
fn bucket_index(latency_us: u64) -> usize {
    BUCKET_BOUNDS.partition_point(|&bound| bound < latency_us)
}

/// Update an atomic max value using compare-and-swap loop
#[inline]
fn update_atomic_max(atomic_max: &AtomicU64, new_value: u64) {
    let mut current_max = atomic_max.load(Ordering::Relaxed);
    while new_value > current_max {
        match atomic_max.compare_exchange_weak(
            current_max,
            new_value,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => break,
            Err(actual) => current_max = actual,
        }
    }
}

/// Load all bucket values without resetting
#[inline]
fn load_buckets(buckets: &[AtomicU64; NUM_BUCKETS]) -> [u64; NUM_BUCKETS] {
    let mut result = [0u64; NUM_BUCKETS];
    for (i, bucket) in buckets.iter().enumerate() {
        result[i] = bucket.load(Ordering::Relaxed);
    }
    result
}

/// Compute percentile from histogram buckets
/// Returns the upper bound of the bucket containing the percentile
fn percentile_from_buckets(buckets: &[u64; NUM_BUCKETS], percentile: f64) -> u64 {
    let total: u64 = buckets.iter().sum();
    if total == 0 {
        return 0;
    }

    let target = ((total as f64 * percentile).ceil() as u64).max(1);
    let mut cumulative = 0u64;

    // Upper bounds for each bucket (last bucket uses 2x the previous bound)
    const BUCKET_UPPER_BOUNDS: [u64; NUM_BUCKETS] =
        [100, 200, 400, 800, 1600, 3200, 6400, 12800, 25600, 51200, 102400];

    for (i, &count) in buckets.iter().enumerate() {
        cumulative += count;
        if cumulative >= target {
            return BUCKET_UPPER_BOUNDS[i];
        }
    }
    BUCKET_UPPER_BOUNDS[NUM_BUCKETS - 1]
}

/// Lock-free relay metrics collector
pub struct RelayMetrics {
    /// Pushes merged into the store (monotonic)
    ingest_accepted: AtomicU64,
    /// Pushes rejected by validation (monotonic)
    ingest_rejected: AtomicU64,
    /// Unknown fields silently dropped from accepted pushes (monotonic)
    fields_dropped: AtomicU64,
    /// GET /metrics responses served (monotonic)
    queries_served: AtomicU64,
    /// Requests for unknown routes (monotonic)
    not_found: AtomicU64,
    /// Request handling latency histogram buckets (cumulative)
    latency_buckets: [AtomicU64; NUM_BUCKETS],
    /// Sum of request latencies in microseconds (cumulative)
    latency_sum_us: AtomicU64,
    /// Requests since last report (reset on report)
    requests_since_report: AtomicU64,
    /// Max latency since last report (reset on report)
    latency_max_us: AtomicU64,
    /// Last report time (only accessed from reporter, not atomic)
    last_report_time: parking_lot::Mutex<Instant>,
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self {
            ingest_accepted: AtomicU64::new(0),
            ingest_rejected: AtomicU64::new(0),
            fields_dropped: AtomicU64::new(0),
            queries_served: AtomicU64::new(0),
            not_found: AtomicU64::new(0),
            latency_buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            latency_sum_us: AtomicU64::new(0),
            requests_since_report: AtomicU64::new(0),
            latency_max_us: AtomicU64::new(0),
            last_report_time: parking_lot::Mutex::new(Instant::now()),
        }
    }

    #[inline]
    pub fn record_ingest_accepted(&self, dropped_fields: usize) {
        self.ingest_accepted.fetch_add(1, Ordering::Relaxed);
        self.fields_dropped.fetch_add(dropped_fields as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_ingest_rejected(&self) {
        self.ingest_rejected.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_query(&self) {
        self.queries_served.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_not_found(&self) {
        self.not_found.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one handled request (any route)
    #[inline]
    pub fn record_request(&self, latency_us: u64) {
        self.requests_since_report.fetch_add(1, Ordering::Relaxed);
        self.latency_sum_us.fetch_add(latency_us, Ordering::Relaxed);
        self.latency_buckets[bucket_index(latency_us)].fetch_add(1, Ordering::Relaxed);
        update_atomic_max(&self.latency_max_us, latency_us);
    }

    pub fn ingest_accepted(&self) -> u64 {
        self.ingest_accepted.load(Ordering::Relaxed)
    }

    pub fn ingest_rejected(&self) -> u64 {
        self.ingest_rejected.load(Ordering::Relaxed)
    }

    pub fn queries_served(&self) -> u64 {
        self.queries_served.load(Ordering::Relaxed)
    }

    /// Point-in-time view of cumulative counters; resets nothing
    pub fn snapshot(&self) -> StatsSnapshot {
        let latency_buckets = load_buckets(&self.latency_buckets);
        let requests_total: u64 = latency_buckets.iter().sum();
        let latency_sum_us = self.latency_sum_us.load(Ordering::Relaxed);

        StatsSnapshot {
            ingest_accepted: self.ingest_accepted.load(Ordering::Relaxed),
            ingest_rejected: self.ingest_rejected.load(Ordering::Relaxed),
            fields_dropped: self.fields_dropped.load(Ordering::Relaxed),
            queries_served: self.queries_served.load(Ordering::Relaxed),
            not_found: self.not_found.load(Ordering::Relaxed),
            requests_total,
            latency_buckets,
            latency_sum_us,
            latency_p50_us: percentile_from_buckets(&latency_buckets, 0.50),
            latency_p99_us: percentile_from_buckets(&latency_buckets, 0.99),
        }
    }

    /// Snapshot plus windowed rate, then reset the windowed counters
    pub fn report(&self) -> StatsReport {
        let window_requests = self.requests_since_report.swap(0, Ordering::Relaxed);
        let window_max_latency_us = self.latency_max_us.swap(0, Ordering::Relaxed);

        let elapsed = {
            let mut last = self.last_report_time.lock();
            let elapsed = last.elapsed();
            *last = Instant::now();
            elapsed
        };

        let requests_per_sec = if elapsed.as_secs_f64() > 0.0 {
            window_requests as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        StatsReport {
            snapshot: self.snapshot(),
            window_requests,
            requests_per_sec,
            window_max_latency_us,
        }
    }
}

impl Default for RelayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Number of histogram buckets (exported for Prometheus formatting)
pub const METRICS_NUM_BUCKETS: usize = NUM_BUCKETS;

/// Exported bucket bounds for Prometheus formatting
pub const METRICS_BUCKET_BOUNDS: [u64; 10] = BUCKET_BOUNDS;

#[derive(Debug, Clone)]
pub struct StatsSnapshot {
    pub ingest_accepted: u64,
    pub ingest_rejected: u64,
    pub fields_dropped: u64,
    pub queries_served: u64,
    pub not_found: u64,
    pub requests_total: u64,
    /// Request latency histogram buckets
    /// Bounds: ≤100, ≤200, ≤400, ≤800, ≤1600, ≤3200, ≤6400, ≤12800, ≤25600, ≤51200, >51200 µs
    pub latency_buckets: [u64; NUM_BUCKETS],
    pub latency_sum_us: u64,
    pub latency_p50_us: u64,
    pub latency_p99_us: u64,
}

#[derive(Debug, Clone)]
pub struct StatsReport {
    pub snapshot: StatsSnapshot,
    pub window_requests: u64,
    pub requests_per_sec: f64,
    pub window_max_latency_us: u64,
}

impl StatsReport {
    pub fn log(&self) {
        info!(
            ingest_accepted = %self.snapshot.ingest_accepted,
            ingest_rejected = %self.snapshot.ingest_rejected,
            fields_dropped = %self.snapshot.fields_dropped,
            queries = %self.snapshot.queries_served,
            requests_per_sec = format!("{:.1}", self.requests_per_sec),
            p50_us = %self.snapshot.latency_p50_us,
            p99_us = %self.snapshot.latency_p99_us,
            max_us = %self.window_max_latency_us,
            "relay_stats"
        );
    }
}
