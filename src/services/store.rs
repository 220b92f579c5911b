//! Metric store - single owner of the latest metric record
//!
//! Writers are serialized behind one write lock and publish a complete new
//! record; readers hold the shared lock only long enough to clone an `Arc`.
//! A reader racing a merge therefore sees either the whole pre-merge or the
//! whole post-merge record, never a mix.
//!
//! The store is a latest-value cache: pushes carry no ordering key, so a
//! delayed push overwrites newer state (last write wins).

use crate::domain::record::{MetricRecord, PartialRecord, COMPUTED_FIELDS, THRESHOLD};
use crate::domain::validation::{check_invariants, ValidationError};
use parking_lot::RwLock;
use std::sync::Arc;

struct StoreState {
    record: Arc<MetricRecord>,
    /// Incremented on every merge that changed at least one field
    revision: u64,
}

/// Consistent view of the store at one point in time
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub record: Arc<MetricRecord>,
    pub revision: u64,
}

/// Result of an accepted merge
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub record: Arc<MetricRecord>,
    pub revision: u64,
    /// Fields written by this merge
    pub applied: Vec<String>,
    /// Fields ignored because the store does not track them
    pub dropped: Vec<String>,
}

pub struct MetricStore {
    state: RwLock<StoreState>,
}

impl MetricStore {
    /// Create a store seeded with the given record.
    ///
    /// The seed's keys (plus the derived field names) fix the set of fields
    /// producers may write.
    pub fn new(initial: MetricRecord) -> Self {
        Self { state: RwLock::new(StoreState { record: Arc::new(initial), revision: 0 }) }
    }

    /// Store seeded with `MetricRecord::baseline()`
    pub fn with_baseline() -> Self {
        Self::new(MetricRecord::baseline())
    }

    /// Deep copy of the current record
    pub fn read(&self) -> MetricRecord {
        (*self.snapshot().record).clone()
    }

    /// Shared view of the current record and its revision
    pub fn snapshot(&self) -> Snapshot {
        let state = self.state.read();
        Snapshot { record: Arc::clone(&state.record), revision: state.revision }
    }

    pub fn revision(&self) -> u64 {
        self.state.read().revision
    }

    /// Whether a producer may write this field.
    ///
    /// Computed fields are never stored; they are derived from the counts on
    /// every read.
    pub fn recognizes(record: &MetricRecord, field: &str) -> bool {
        if COMPUTED_FIELDS.contains(&field) {
            return false;
        }
        record.contains(field) || field == THRESHOLD
    }

    /// Overwrite every recognized field present in `partial`.
    ///
    /// Unrecognized fields are dropped. The candidate record must satisfy
    /// the record invariants; otherwise nothing is written.
    pub fn merge(&self, partial: PartialRecord) -> Result<MergeOutcome, ValidationError> {
        let mut state = self.state.write();

        let mut next = (*state.record).clone();
        let mut applied = Vec::new();
        let mut dropped = Vec::new();

        for (field, value) in partial {
            if Self::recognizes(&next, &field) {
                next.insert(field.clone(), value);
                applied.push(field);
            } else {
                dropped.push(field);
            }
        }

        check_invariants(&next)?;

        if next != *state.record {
            state.record = Arc::new(next);
            state.revision += 1;
        }

        Ok(MergeOutcome {
            record: Arc::clone(&state.record),
            revision: state.revision,
            applied,
            dropped,
        })
    }
}

impl Default for MetricStore {
    fn default() -> Self {
        Self::with_baseline()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::record::{
        MetricValue, ANOMALIES, DEFAULT_THRESHOLD, EPOCHS, F1, FPS, PERCENT_ANOMALOUS, PRECISION,
        RECALL, SCANNED, TOTAL_NORMAL,
    };
    use serde_json::json;
    use std::thread;

    fn partial(value: serde_json::Value) -> PartialRecord {
        PartialRecord::from_json_value(value).unwrap()
    }

    #[test]
    fn test_merge_overwrites_only_supplied_fields() {
        let store = MetricStore::with_baseline();
        let before = store.read();

        let outcome = store.merge(partial(json!({"scanned": 500, "anomalies": 20}))).unwrap();
        assert_eq!(outcome.applied, vec!["anomalies".to_string(), "scanned".to_string()]);
        assert!(outcome.dropped.is_empty());

        let after = store.read();
        assert_eq!(after.scanned(), 500);
        assert_eq!(after.anomalies(), 20);
        for (field, value) in before.iter() {
            if field != SCANNED && field != ANOMALIES {
                assert_eq!(after.get(field), Some(value), "field {field} changed");
            }
        }
    }

    #[test]
    fn test_unknown_fields_dropped() {
        let store = MetricStore::with_baseline();
        let outcome = store.merge(partial(json!({"fps": 12.0, "gpu_temp": 71}))).unwrap();

        assert_eq!(outcome.dropped, vec!["gpu_temp".to_string()]);
        let record = store.read();
        assert!(!record.contains("gpu_temp"));
        assert_eq!(record.fps(), 12.0);
    }

    #[test]
    fn test_computed_fields_are_not_stored() {
        let store = MetricStore::with_baseline();
        let outcome = store
            .merge(partial(json!({
                "scanned": 10,
                "anomalies": 3,
                "total_normal": 500,
                "percent_anomalous": 30.0
            })))
            .unwrap();
        let mut dropped = outcome.dropped.clone();
        dropped.sort();
        assert_eq!(dropped, vec![PERCENT_ANOMALOUS.to_string(), TOTAL_NORMAL.to_string()]);

        let stored = store.read();
        assert!(!stored.contains(TOTAL_NORMAL));
        assert!(!stored.contains(PERCENT_ANOMALOUS));
        assert_eq!(stored.with_derived(DEFAULT_THRESHOLD).count(TOTAL_NORMAL), Some(7));

        // A later counts-only push must not leave a stale derived value behind
        store.merge(partial(json!({"scanned": 1000, "anomalies": 40}))).unwrap();
        let view = store.read().with_derived(DEFAULT_THRESHOLD);
        assert_eq!(view.count(TOTAL_NORMAL), Some(960));
        assert_eq!(view.number(PERCENT_ANOMALOUS), Some(4.0));
    }

    #[test]
    fn test_threshold_accepted_before_first_push() {
        let store = MetricStore::with_baseline();
        let outcome = store.merge(partial(json!({"threshold": 0.8}))).unwrap();
        assert!(outcome.dropped.is_empty());
        assert_eq!(store.read().number(THRESHOLD), Some(0.8));
    }

    #[test]
    fn test_read_is_idempotent() {
        let store = MetricStore::with_baseline();
        store.merge(partial(json!({"scanned": 3}))).unwrap();
        assert_eq!(store.read(), store.read());
    }

    #[test]
    fn test_rejected_merge_leaves_store_untouched() {
        let store = MetricStore::with_baseline();
        store.merge(partial(json!({"scanned": 100, "anomalies": 5}))).unwrap();
        let before = store.snapshot();

        let err = store.merge(partial(json!({"anomalies": 101, "fps": 9.5}))).unwrap_err();
        assert!(matches!(err, ValidationError::AnomaliesExceedScanned { .. }));

        let after = store.snapshot();
        assert_eq!(*after.record, *before.record);
        assert_eq!(after.revision, before.revision);
    }

    #[test]
    fn test_revision_tracks_changes() {
        let store = MetricStore::with_baseline();
        assert_eq!(store.revision(), 0);

        store.merge(partial(json!({"scanned": 1}))).unwrap();
        assert_eq!(store.revision(), 1);

        // Same payload again is a no-op
        store.merge(partial(json!({"scanned": 1}))).unwrap();
        assert_eq!(store.revision(), 1);

        // Only unknown fields
        store.merge(partial(json!({"unknown": 1}))).unwrap();
        assert_eq!(store.revision(), 1);
    }

    #[test]
    fn test_series_replaced_as_a_whole() {
        let store = MetricStore::with_baseline();
        store
            .merge(partial(json!({
                "epochs": [1, 2],
                "precision": [0.5, 0.6],
                "recall": [0.4, 0.5],
                "f1": [0.45, 0.55]
            })))
            .unwrap();

        let record = store.read();
        assert_eq!(record.series(EPOCHS), vec![1.0, 2.0]);
        assert_eq!(record.series(F1), vec![0.45, 0.55]);

        // A lone series of a different length breaks the parallel-series invariant
        let err = store.merge(partial(json!({"precision": [0.5, 0.6, 0.7]}))).unwrap_err();
        assert!(matches!(err, ValidationError::SeriesLengthMismatch { .. }));
        assert_eq!(store.read().series(PRECISION), vec![0.5, 0.6]);
        assert_eq!(store.read().series(RECALL), vec![0.4, 0.5]);
    }

    #[test]
    fn test_concurrent_disjoint_merges() {
        const WRITERS: usize = 8;
        const ROUNDS: i64 = 200;

        // Each writer owns a pair of fields that it always writes together
        let mut seed = MetricRecord::new();
        for w in 0..WRITERS {
            seed.insert(format!("a{w}"), MetricValue::int(0));
            seed.insert(format!("b{w}"), MetricValue::int(0));
        }
        let store = Arc::new(MetricStore::new(seed));

        let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let reader = {
            let store = store.clone();
            let stop = stop.clone();
            thread::spawn(move || {
                let mut reads = 0u64;
                while !stop.load(std::sync::atomic::Ordering::Relaxed) {
                    let record = store.read();
                    for w in 0..WRITERS {
                        assert_eq!(
                            record.get(&format!("a{w}")),
                            record.get(&format!("b{w}")),
                            "torn record observed"
                        );
                    }
                    reads += 1;
                }
                reads
            })
        };

        let writers: Vec<_> = (0..WRITERS)
            .map(|w| {
                let store = store.clone();
                thread::spawn(move || {
                    for round in 1..=ROUNDS {
                        let mut push = MetricRecord::new();
                        push.insert(format!("a{w}"), MetricValue::int(round));
                        push.insert(format!("b{w}"), MetricValue::int(round));
                        store.merge(push.into()).unwrap();
                    }
                })
            })
            .collect();

        for handle in writers {
            handle.join().unwrap();
        }
        stop.store(true, std::sync::atomic::Ordering::Relaxed);
        reader.join().unwrap();

        let record = store.read();
        for w in 0..WRITERS {
            assert_eq!(record.count(&format!("a{w}")), Some(ROUNDS as u64));
            assert_eq!(record.count(&format!("b{w}")), Some(ROUNDS as u64));
        }
        assert_eq!(store.revision(), WRITERS as u64 * ROUNDS as u64);
    }

    #[test]
    fn test_baseline_fields_unchanged_by_empty_merge() {
        let store = MetricStore::with_baseline();
        let outcome = store.merge(PartialRecord::default()).unwrap();
        assert_eq!(*outcome.record, MetricRecord::baseline());
        assert_eq!(store.read().number(FPS), Some(0.0));
    }
}
