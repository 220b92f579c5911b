//! Services - business logic and state management
//!
//! - `store` - Single owner of the latest metric record
//! - `ingest` - Validates producer pushes and merges them
//! - `query` - Read-only view for consumers
//! - `poller` - Dashboard refresh loop with last-known-good fallback
//! - `simulator` - Synthetic producer for load and demo

pub mod ingest;
pub mod poller;
pub mod query;
pub mod simulator;
pub mod store;

// Re-export commonly used types
pub use ingest::{IngestAck, IngestRejection, IngestService};
pub use poller::{
    DashboardFrame, DashboardPoller, Freshness, MetricsSource, PollerSettings, PollerStats,
    Renderer,
};
pub use query::{QueryResponse, QueryService};
pub use simulator::{synthesize, MetricsSink, Simulator, SimulatorReport, SimulatorSettings};
pub use store::{MergeOutcome, MetricStore, Snapshot};
