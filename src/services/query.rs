//! Query service - read-only view of the store for consumers

use crate::domain::record::MetricRecord;
use crate::infra::metrics::RelayMetrics;
use crate::services::store::MetricStore;
use std::sync::Arc;

/// Current record as served to consumers
#[derive(Debug, Clone)]
pub struct QueryResponse {
    /// Stored fields plus the derived fields
    pub record: MetricRecord,
    pub revision: u64,
}

#[derive(Clone)]
pub struct QueryService {
    store: Arc<MetricStore>,
    metrics: Arc<RelayMetrics>,
    default_threshold: f64,
}

impl QueryService {
    pub fn new(store: Arc<MetricStore>, metrics: Arc<RelayMetrics>, default_threshold: f64) -> Self {
        Self { store, metrics, default_threshold }
    }

    /// Never fails and never mutates the store
    pub fn current(&self) -> QueryResponse {
        let snapshot = self.store.snapshot();
        self.metrics.record_query();
        QueryResponse {
            record: snapshot.record.with_derived(self.default_threshold),
            revision: snapshot.revision,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::record::{PartialRecord, FPS, PERCENT_ANOMALOUS, THRESHOLD, TOTAL_NORMAL};
    use serde_json::json;

    #[test]
    fn test_post_then_get_scenario() {
        let store = Arc::new(MetricStore::with_baseline());
        let metrics = Arc::new(RelayMetrics::new());
        let query = QueryService::new(store.clone(), metrics.clone(), 0.5);

        let initial = query.current().record;
        assert_eq!(initial.scanned(), 0);
        assert_eq!(initial.number(PERCENT_ANOMALOUS), Some(0.0));

        let push = PartialRecord::from_json_value(json!({"scanned": 500, "anomalies": 20})).unwrap();
        store.merge(push).unwrap();

        let response = query.current();
        assert_eq!(response.revision, 1);
        assert_eq!(response.record.scanned(), 500);
        assert_eq!(response.record.anomalies(), 20);
        assert_eq!(response.record.count(TOTAL_NORMAL), Some(480));
        assert_eq!(response.record.number(PERCENT_ANOMALOUS), Some(4.0));
        assert_eq!(response.record.number(FPS), Some(0.0));
        assert_eq!(metrics.queries_served(), 2);
    }

    #[test]
    fn test_query_does_not_store_derived_fields() {
        let store = Arc::new(MetricStore::with_baseline());
        let query = QueryService::new(store.clone(), Arc::new(RelayMetrics::new()), 0.5);

        let _ = query.current();
        assert!(!store.read().contains(TOTAL_NORMAL));
        assert_eq!(store.revision(), 0);
    }

    #[test]
    fn test_configured_threshold_served_until_pushed() {
        let store = Arc::new(MetricStore::with_baseline());
        let query = QueryService::new(store.clone(), Arc::new(RelayMetrics::new()), 0.7);
        assert_eq!(query.current().record.number(THRESHOLD), Some(0.7));

        let push = PartialRecord::from_json_value(json!({"threshold": 0.25})).unwrap();
        store.merge(push).unwrap();
        assert_eq!(query.current().record.number(THRESHOLD), Some(0.25));
    }

    #[test]
    fn test_supplied_derived_values_do_not_go_stale() {
        let store = Arc::new(MetricStore::with_baseline());
        let query = QueryService::new(store.clone(), Arc::new(RelayMetrics::new()), 0.5);

        let push = PartialRecord::from_json_value(
            json!({"scanned": 10, "anomalies": 3, "total_normal": 7, "percent_anomalous": 30.0}),
        )
        .unwrap();
        store.merge(push).unwrap();

        let push = PartialRecord::from_json_value(json!({"scanned": 1000, "anomalies": 40})).unwrap();
        store.merge(push).unwrap();

        let record = query.current().record;
        assert_eq!(record.count(TOTAL_NORMAL), Some(960));
        assert_eq!(record.number(PERCENT_ANOMALOUS), Some(4.0));
    }
}
