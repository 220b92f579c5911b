//! Domain models - the metric snapshot and its validation rules
//!
//! This module contains the canonical data types used throughout the system:
//! - `MetricRecord` - the latest snapshot of every tracked metric
//! - `PartialRecord` - a validated producer push, merged field by field
//! - `MetricValue` - a scalar number or a numeric series
//! - `ValidationError` - why a push was rejected

pub mod record;
pub mod validation;

// Re-export commonly used types at module level
pub use record::{MetricRecord, MetricValue, PartialRecord, Scalar};
pub use validation::ValidationError;
