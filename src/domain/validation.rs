//! Payload validation for producer pushes
//!
//! Two layers: shape checks run on every decoded body (mapping of name to
//! number or numeric array, counts are non-negative integers), and record
//! invariants run on the candidate record before the store publishes it.

use crate::domain::record::{
    MetricRecord, MetricValue, Scalar, ANOMALIES, FPS, PERCENT_ANOMALOUS, SCANNED, SERIES_FIELDS,
    THRESHOLD, TOTAL_NORMAL,
};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("malformed JSON: {0}")]
    MalformedJson(#[from] serde_json::Error),

    #[error("payload must be a JSON object, got {0}")]
    NotAnObject(&'static str),

    #[error("field '{field}' must be {expected}, got {found}")]
    WrongKind { field: String, expected: &'static str, found: &'static str },

    #[error("threshold must be within [0, 1], got {0}")]
    ThresholdOutOfRange(f64),

    #[error("anomalies ({anomalies}) exceed scanned ({scanned})")]
    AnomaliesExceedScanned { scanned: u64, anomalies: u64 },

    #[error("series '{field}' has length {found}, expected {expected}")]
    SeriesLengthMismatch { field: String, expected: usize, found: usize },
}

/// Expected value shape of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Count,
    Number,
    Series,
    /// Fields the relay has no schema for: any number or numeric array
    Any,
}

impl FieldKind {
    fn of(field: &str) -> Self {
        match field {
            SCANNED | ANOMALIES | TOTAL_NORMAL => FieldKind::Count,
            FPS | PERCENT_ANOMALOUS | THRESHOLD => FieldKind::Number,
            f if SERIES_FIELDS.contains(&f) => FieldKind::Series,
            _ => FieldKind::Any,
        }
    }

    fn describe(self) -> &'static str {
        match self {
            FieldKind::Count => "a non-negative integer",
            FieldKind::Number => "a number",
            FieldKind::Series => "an array of numbers",
            FieldKind::Any => "a number or an array of numbers",
        }
    }

    fn accepts(self, value: &MetricValue) -> bool {
        match self {
            FieldKind::Count => value.as_count().is_some(),
            FieldKind::Number => value.as_scalar().is_some(),
            FieldKind::Series => value.as_series().is_some(),
            FieldKind::Any => true,
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn scalar_from_number(number: &serde_json::Number) -> Option<Scalar> {
    if let Some(v) = number.as_i64() {
        return Some(Scalar::Int(v));
    }
    // u64 above i64::MAX and every fractional value land here
    number.as_f64().filter(|v| v.is_finite()).map(Scalar::Float)
}

fn convert_value(field: &str, value: &Value) -> Result<MetricValue, ValidationError> {
    let kind = FieldKind::of(field);
    let wrong_kind = |found: &'static str| ValidationError::WrongKind {
        field: field.to_string(),
        expected: kind.describe(),
        found,
    };

    let converted = match value {
        Value::Number(n) => {
            MetricValue::Scalar(scalar_from_number(n).ok_or_else(|| wrong_kind("a non-finite number"))?)
        }
        Value::Array(items) => {
            let mut series = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::Number(n) => series.push(
                        scalar_from_number(n).ok_or_else(|| wrong_kind("a non-finite number"))?,
                    ),
                    other => return Err(wrong_kind(json_kind(other))),
                }
            }
            MetricValue::Series(series)
        }
        other => return Err(wrong_kind(json_kind(other))),
    };

    if !kind.accepts(&converted) {
        return Err(wrong_kind(converted.kind()));
    }
    Ok(converted)
}

/// Decode a JSON object into typed metric fields
pub(crate) fn fields_from_value(
    value: Value,
) -> Result<BTreeMap<String, MetricValue>, ValidationError> {
    let Value::Object(map) = value else {
        return Err(ValidationError::NotAnObject(json_kind(&value)));
    };

    let mut fields = BTreeMap::new();
    for (name, raw) in &map {
        let converted = convert_value(name, raw)?;
        fields.insert(name.clone(), converted);
    }
    Ok(fields)
}

/// Check cross-field invariants of a full record
pub fn check_invariants(record: &MetricRecord) -> Result<(), ValidationError> {
    if let (Some(scanned), Some(anomalies)) = (record.count(SCANNED), record.count(ANOMALIES)) {
        if anomalies > scanned {
            return Err(ValidationError::AnomaliesExceedScanned { scanned, anomalies });
        }
    }

    if let Some(threshold) = record.number(THRESHOLD) {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ValidationError::ThresholdOutOfRange(threshold));
        }
    }

    let mut expected: Option<(&str, usize)> = None;
    for field in SERIES_FIELDS {
        let Some(series) = record.get(field).and_then(MetricValue::as_series) else {
            continue;
        };
        match expected {
            None => expected = Some((field, series.len())),
            Some((_, len)) if len != series.len() => {
                return Err(ValidationError::SeriesLengthMismatch {
                    field: field.to_string(),
                    expected: len,
                    found: series.len(),
                });
            }
            Some(_) => {}
        }
    }

    Ok(())
}
