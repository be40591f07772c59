//! dsmr-metrics — live meter readings and their exposition.
//!
//! ```text
//! MetricState
//!   ├── apply()    ← ingestion loop, one decoded update at a time
//!   ├── record_*() ← ingestion counters
//!   └── snapshot() → Snapshot
//!
//! Prometheus exposition
//!   └── render_prometheus(&Snapshot) → text/plain for the scrape endpoint
//! ```

pub mod prometheus;
pub mod state;

pub use prometheus::render_prometheus;
pub use state::{IngestCounters, IngestStatus, MetricState, Reading, Snapshot};
