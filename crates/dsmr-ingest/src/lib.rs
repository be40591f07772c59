//! dsmr-ingest — feeds telegram lines into the metric state.
//!
//! ```text
//! LineSource (serial device | replay file)
//!   └── IngestLoop::run()
//!         ├── CaptureSink::write()   (optional raw tee)
//!         ├── decode()               (dsmr-core)
//!         └── MetricState::apply()   (dsmr-metrics)
//! ```
//!
//! The loop has two states, running and stopped. It stops for good on end
//! of stream, a read error, or process shutdown; there is no reconnect.

pub mod capture;
pub mod error;
pub mod ingest;
pub mod source;

pub use capture::CaptureSink;
pub use error::{SourceError, SourceResult};
pub use ingest::{IngestLoop, StopReason};
pub use source::{open_replay, open_serial, LineSource, Pacing, ReaderSource};
