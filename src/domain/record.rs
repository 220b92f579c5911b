//! Metric record - the snapshot shape shared by producers, the store and dashboards

use crate::domain::validation::{self, ValidationError};
use serde::Serialize;
use std::collections::BTreeMap;

/// Items processed by the producer
pub const SCANNED: &str = "scanned";
/// Items flagged as anomalous
pub const ANOMALIES: &str = "anomalies";
/// Items not flagged (derived as `scanned - anomalies`)
pub const TOTAL_NORMAL: &str = "total_normal";
/// Processing rate in frames per second
pub const FPS: &str = "fps";
/// Share of anomalous items in percent (derived)
pub const PERCENT_ANOMALOUS: &str = "percent_anomalous";
/// Decision threshold in [0, 1]
pub const THRESHOLD: &str = "threshold";
pub const EPOCHS: &str = "epochs";
pub const PRECISION: &str = "precision";
pub const RECALL: &str = "recall";
pub const F1: &str = "f1";

/// Parallel time-series fields; index i of each describes evaluation round i
pub const SERIES_FIELDS: [&str; 4] = [EPOCHS, PRECISION, RECALL, F1];

/// Fields always computed from `scanned` and `anomalies` on read; never stored
pub const COMPUTED_FIELDS: [&str; 2] = [TOTAL_NORMAL, PERCENT_ANOMALOUS];

/// Threshold reported when neither the producer nor the config supplies one
pub const DEFAULT_THRESHOLD: f64 = 0.5;

/// A single JSON number, keeping integers and floats apart so counts
/// round-trip without gaining a fractional part.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    Int(i64),
    Float(f64),
}

impl Scalar {
    pub fn as_f64(self) -> f64 {
        match self {
            Scalar::Int(v) => v as f64,
            Scalar::Float(v) => v,
        }
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Float(value)
    }
}

/// Value held by one metric field
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetricValue {
    Scalar(Scalar),
    Series(Vec<Scalar>),
}

impl MetricValue {
    pub fn int(value: i64) -> Self {
        MetricValue::Scalar(Scalar::Int(value))
    }

    pub fn float(value: f64) -> Self {
        MetricValue::Scalar(Scalar::Float(value))
    }

    pub fn series<I, T>(values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Scalar>,
    {
        MetricValue::Series(values.into_iter().map(Into::into).collect())
    }

    pub fn as_scalar(&self) -> Option<Scalar> {
        match self {
            MetricValue::Scalar(s) => Some(*s),
            MetricValue::Series(_) => None,
        }
    }

    pub fn as_series(&self) -> Option<&[Scalar]> {
        match self {
            MetricValue::Series(items) => Some(items),
            MetricValue::Scalar(_) => None,
        }
    }

    /// Non-negative integer view, used for count fields
    pub fn as_count(&self) -> Option<u64> {
        match self {
            MetricValue::Scalar(Scalar::Int(v)) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Human-readable kind, used in validation messages
    pub fn kind(&self) -> &'static str {
        match self {
            MetricValue::Scalar(Scalar::Int(_)) => "an integer",
            MetricValue::Scalar(Scalar::Float(_)) => "a float",
            MetricValue::Series(_) => "an array",
        }
    }
}

/// Percentage of anomalous items; 0 when nothing has been scanned
pub fn percent_anomalous(scanned: u64, anomalies: u64) -> f64 {
    if scanned == 0 {
        return 0.0;
    }
    anomalies as f64 * 100.0 / scanned as f64
}

/// Items not flagged as anomalous
pub fn total_normal(scanned: u64, anomalies: u64) -> u64 {
    scanned.saturating_sub(anomalies)
}

/// The current snapshot of all tracked metric fields.
///
/// Serializes as a flat JSON object. Keys are kept in sorted order so two
/// snapshots with the same content always produce the same body.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MetricRecord {
    fields: BTreeMap<String, MetricValue>,
}

impl MetricRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start-of-process state: zero counts and empty evaluation series.
    ///
    /// `threshold` is left out so readers see the configured default until a
    /// producer sends one.
    pub fn baseline() -> Self {
        let mut record = Self::new();
        record.insert(SCANNED, MetricValue::int(0));
        record.insert(ANOMALIES, MetricValue::int(0));
        record.insert(FPS, MetricValue::float(0.0));
        for field in SERIES_FIELDS {
            record.insert(field, MetricValue::Series(Vec::new()));
        }
        record
    }

    /// Build a record from a decoded JSON body, checking value shapes only.
    ///
    /// Used by consumers reading `GET /metrics`; invariants between fields
    /// are the server's concern.
    pub fn from_json_value(value: serde_json::Value) -> Result<Self, ValidationError> {
        Ok(Self { fields: validation::fields_from_value(value)? })
    }

    pub fn from_slice(body: &[u8]) -> Result<Self, ValidationError> {
        let value: serde_json::Value = serde_json::from_slice(body)?;
        Self::from_json_value(value)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: MetricValue) -> Option<MetricValue> {
        self.fields.insert(name.into(), value)
    }

    pub fn get(&self, name: &str) -> Option<&MetricValue> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetricValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn count(&self, name: &str) -> Option<u64> {
        self.get(name).and_then(MetricValue::as_count)
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(MetricValue::as_scalar).map(Scalar::as_f64)
    }

    /// Series as plain floats; empty when absent
    pub fn series(&self, name: &str) -> Vec<f64> {
        self.get(name)
            .and_then(MetricValue::as_series)
            .map(|items| items.iter().map(|s| s.as_f64()).collect())
            .unwrap_or_default()
    }

    pub fn scanned(&self) -> u64 {
        self.count(SCANNED).unwrap_or(0)
    }

    pub fn anomalies(&self) -> u64 {
        self.count(ANOMALIES).unwrap_or(0)
    }

    pub fn fps(&self) -> f64 {
        self.number(FPS).unwrap_or(0.0)
    }

    /// Copy of this record with the derived fields filled in.
    ///
    /// `total_normal` and `percent_anomalous` are always recomputed from the
    /// counts (missing counts are zero). `threshold` falls back to
    /// `default_threshold` only when the record has none.
    pub fn with_derived(&self, default_threshold: f64) -> MetricRecord {
        let mut record = self.clone();
        let scanned = self.scanned();
        let anomalies = self.anomalies();

        let normal = i64::try_from(total_normal(scanned, anomalies)).unwrap_or(i64::MAX);
        record.insert(TOTAL_NORMAL, MetricValue::int(normal));
        record.insert(PERCENT_ANOMALOUS, MetricValue::float(percent_anomalous(scanned, anomalies)));
        if !record.contains(THRESHOLD) {
            record.insert(THRESHOLD, MetricValue::float(default_threshold));
        }
        record
    }
}

/// A validated producer push. Only the fields present are written on merge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialRecord {
    fields: BTreeMap<String, MetricValue>,
}

impl PartialRecord {
    /// Parse and validate a request body
    pub fn from_slice(body: &[u8]) -> Result<Self, ValidationError> {
        let value: serde_json::Value = serde_json::from_slice(body)?;
        Self::from_json_value(value)
    }

    pub fn from_json_value(value: serde_json::Value) -> Result<Self, ValidationError> {
        Ok(Self { fields: validation::fields_from_value(value)? })
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetricValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl IntoIterator for PartialRecord {
    type Item = (String, MetricValue);
    type IntoIter = std::collections::btree_map::IntoIter<String, MetricValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

impl From<MetricRecord> for PartialRecord {
    fn from(record: MetricRecord) -> Self {
        Self { fields: record.fields }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_anomalous_zero_scanned() {
        let pct = percent_anomalous(0, 0);
        assert_eq!(pct, 0.0);
        assert!(pct.is_finite());
    }

    #[test]
    fn test_derived_values() {
        assert_eq!(total_normal(1000, 40), 960);
        assert_eq!(percent_anomalous(1000, 40), 4.0);
    }

    #[test]
    fn test_baseline() {
        let record = MetricRecord::baseline();
        assert_eq!(record.scanned(), 0);
        assert_eq!(record.anomalies(), 0);
        assert_eq!(record.fps(), 0.0);
        assert!(!record.contains(THRESHOLD));
        assert!(record.series(EPOCHS).is_empty());
        assert!(!record.contains(TOTAL_NORMAL));
        assert!(!record.contains(PERCENT_ANOMALOUS));
    }

    #[test]
    fn test_with_derived_fills_absent_fields() {
        let mut record = MetricRecord::new();
        record.insert(SCANNED, MetricValue::int(1000));
        record.insert(ANOMALIES, MetricValue::int(40));

        let view = record.with_derived(0.7);
        assert_eq!(view.count(TOTAL_NORMAL), Some(960));
        assert_eq!(view.number(PERCENT_ANOMALOUS), Some(4.0));
        assert_eq!(view.number(THRESHOLD), Some(0.7));
        // Source record is not modified
        assert!(!record.contains(TOTAL_NORMAL));
    }

    #[test]
    fn test_with_derived_recomputes_counts_keeps_threshold() {
        let mut record = MetricRecord::new();
        record.insert(SCANNED, MetricValue::int(10));
        record.insert(ANOMALIES, MetricValue::int(1));
        record.insert(TOTAL_NORMAL, MetricValue::int(500));
        record.insert(PERCENT_ANOMALOUS, MetricValue::float(30.0));
        record.insert(THRESHOLD, MetricValue::float(0.9));

        let view = record.with_derived(DEFAULT_THRESHOLD);
        assert_eq!(view.count(TOTAL_NORMAL), Some(9));
        assert_eq!(view.number(PERCENT_ANOMALOUS), Some(10.0));
        assert_eq!(view.number(THRESHOLD), Some(0.9));
    }

    #[test]
    fn test_baseline_view_uses_configured_threshold() {
        let view = MetricRecord::baseline().with_derived(0.7);
        assert_eq!(view.number(THRESHOLD), Some(0.7));
    }

    #[test]
    fn test_with_derived_missing_counts() {
        let view = MetricRecord::new().with_derived(DEFAULT_THRESHOLD);
        assert_eq!(view.count(TOTAL_NORMAL), Some(0));
        assert_eq!(view.number(PERCENT_ANOMALOUS), Some(0.0));
    }

    #[test]
    fn test_serializes_as_flat_object() {
        let mut record = MetricRecord::new();
        record.insert(SCANNED, MetricValue::int(500));
        record.insert(FPS, MetricValue::float(18.5));
        record.insert(EPOCHS, MetricValue::series([1_i64, 2, 3]));

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json, serde_json::json!({"scanned": 500, "fps": 18.5, "epochs": [1, 2, 3]}));
    }

    #[test]
    fn test_record_from_slice() {
        let record =
            MetricRecord::from_slice(br#"{"scanned": 12, "precision": [0.5, 0.75]}"#).unwrap();
        assert_eq!(record.scanned(), 12);
        assert_eq!(record.series(PRECISION), vec![0.5, 0.75]);
    }

    #[test]
    fn test_as_count_rejects_negative_and_float() {
        assert_eq!(MetricValue::int(-1).as_count(), None);
        assert_eq!(MetricValue::float(3.0).as_count(), None);
        assert_eq!(MetricValue::int(3).as_count(), Some(3));
    }
}
