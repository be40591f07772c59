//! dsmr-core — decoding DSMR P1 telegram lines into metric updates.
//!
//! ```text
//! raw line ──► DispatchTable::lookup() ──► FieldDescriptor
//!                     │
//!                     ▼
//!              decode() ──► DecodeOutcome { NoMatch | ParseFailure | Update }
//! ```
//!
//! Also hosts the exporter's TOML configuration.

pub mod config;
pub mod decoder;
pub mod error;
pub mod table;
pub mod types;

pub use config::{ExporterConfig, Settings, SourceMode};
pub use decoder::decode;
pub use error::{ConfigError, TableError};
pub use table::DispatchTable;
pub use types::*;
