//! IO modules - external system interfaces
//!
//! - `http` - Relay HTTP server (ingest, query, health, stats)
//! - `client` - HTTP client used by the dashboard and simulator
//! - `prometheus` - Prometheus text format for relay self-metrics
//! - `render` - Dashboard frame renderers (log, channel)

pub mod client;
pub mod http;
pub mod prometheus;
pub mod render;

// Re-export commonly used types
pub use client::{HttpMetricsClient, TransportError};
pub use http::{serve, start_server, AppState, ServerLimits, REVISION_HEADER};
pub use render::{ChannelRenderer, LogRenderer};
