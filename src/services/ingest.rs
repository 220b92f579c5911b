//! Ingest service - validates producer pushes and merges them into the store

use crate::domain::record::{MetricRecord, PartialRecord};
use crate::domain::validation::ValidationError;
use crate::infra::metrics::RelayMetrics;
use crate::services::store::MetricStore;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Acknowledgement body for an accepted push
#[derive(Debug, Clone, Serialize)]
pub struct IngestAck {
    pub status: &'static str,
    /// Full stored record after the merge
    pub metrics: MetricRecord,
    #[serde(skip)]
    pub revision: u64,
}

/// Body sent back for a rejected push
#[derive(Debug, Clone, Serialize)]
pub struct IngestRejection {
    pub status: &'static str,
    pub error: String,
}

impl From<&ValidationError> for IngestRejection {
    fn from(err: &ValidationError) -> Self {
        Self { status: "rejected", error: err.to_string() }
    }
}

#[derive(Clone)]
pub struct IngestService {
    store: Arc<MetricStore>,
    metrics: Arc<RelayMetrics>,
}

impl IngestService {
    pub fn new(store: Arc<MetricStore>, metrics: Arc<RelayMetrics>) -> Self {
        Self { store, metrics }
    }

    /// Validate a raw request body and merge it.
    ///
    /// On any error the store is left untouched.
    pub fn ingest(&self, body: &[u8]) -> Result<IngestAck, ValidationError> {
        let result = PartialRecord::from_slice(body).and_then(|partial| self.apply(partial));
        if let Err(ref e) = result {
            self.metrics.record_ingest_rejected();
            warn!(error = %e, body_bytes = %body.len(), "ingest_rejected");
        }
        result
    }

    /// Merge an already-validated push
    pub fn apply(&self, partial: PartialRecord) -> Result<IngestAck, ValidationError> {
        let outcome = self.store.merge(partial)?;
        self.metrics.record_ingest_accepted(outcome.dropped.len());

        if !outcome.dropped.is_empty() {
            debug!(dropped = ?outcome.dropped, "ingest_unknown_fields_dropped");
        }
        info!(
            revision = %outcome.revision,
            applied = %outcome.applied.len(),
            dropped = %outcome.dropped.len(),
            "ingest_accepted"
        );

        Ok(IngestAck {
            status: "updated",
            metrics: (*outcome.record).clone(),
            revision: outcome.revision,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::record::FPS;

    fn service() -> (IngestService, Arc<MetricStore>, Arc<RelayMetrics>) {
        let store = Arc::new(MetricStore::with_baseline());
        let metrics = Arc::new(RelayMetrics::new());
        (IngestService::new(store.clone(), metrics.clone()), store, metrics)
    }

    #[test]
    fn test_ingest_accepts_partial_push() {
        let (ingest, store, metrics) = service();

        let ack = ingest.ingest(br#"{"scanned": 500, "anomalies": 20}"#).unwrap();
        assert_eq!(ack.status, "updated");
        assert_eq!(ack.metrics.scanned(), 500);
        assert_eq!(ack.metrics.number(FPS), Some(0.0));
        assert_eq!(ack.revision, 1);
        assert_eq!(store.read(), ack.metrics);
        assert_eq!(metrics.ingest_accepted(), 1);
    }

    #[test]
    fn test_ack_body_shape() {
        let (ingest, _, _) = service();
        let ack = ingest.ingest(br#"{"scanned": 5}"#).unwrap();

        let body = serde_json::to_value(&ack).unwrap();
        assert_eq!(body["status"], "updated");
        assert_eq!(body["metrics"]["scanned"], 5);
        assert!(body.get("revision").is_none());
    }

    #[test]
    fn test_malformed_payload_rejected() {
        let (ingest, store, metrics) = service();
        let before = store.read();

        assert!(ingest.ingest(b"not json").is_err());
        assert!(ingest.ingest(b"[1, 2]").is_err());
        assert!(ingest.ingest(br#"{"scanned": "many"}"#).is_err());

        assert_eq!(store.read(), before);
        assert_eq!(store.revision(), 0);
        assert_eq!(metrics.ingest_rejected(), 3);
        assert_eq!(metrics.ingest_accepted(), 0);
    }

    #[test]
    fn test_ingest_is_idempotent() {
        let (ingest, store, _) = service();
        let body = br#"{"scanned": 1200, "anomalies": 32, "fps": 18.5}"#;

        let first = ingest.ingest(body).unwrap();
        let second = ingest.ingest(body).unwrap();
        assert_eq!(first.metrics, second.metrics);
        assert_eq!(store.revision(), 1);
    }

    #[test]
    fn test_rejection_body() {
        let err = ValidationError::NotAnObject("an array");
        let body = serde_json::to_value(IngestRejection::from(&err)).unwrap();
        assert_eq!(body["status"], "rejected");
        assert_eq!(body["error"], "payload must be a JSON object, got an array");
    }
}
