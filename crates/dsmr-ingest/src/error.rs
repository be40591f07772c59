//! Line source error types.

use thiserror::Error;

/// Failures setting up or reading a line source. Fatal to ingestion.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open serial port {path}: {source}")]
    Serial {
        path: String,
        #[source]
        source: tokio_serial::Error,
    },

    #[error("failed to open capture file {path}: {source}")]
    Capture {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("read error: {0}")]
    Read(#[from] std::io::Error),
}

pub type SourceResult<T> = Result<T, SourceError>;
