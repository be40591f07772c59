//! Error types for dispatch tables and configuration.

use thiserror::Error;

/// A dispatch table that violates one of its construction invariants.
#[derive(Debug, Error, PartialEq)]
pub enum TableError {
    #[error("dispatch table is empty")]
    Empty,

    #[error("code {0:?} is empty")]
    EmptyCode(&'static str),

    #[error("code {shorter:?} is a prefix of {longer:?}")]
    OverlappingCodes {
        shorter: &'static str,
        longer: &'static str,
    },

    #[error("code {code:?}: value range {start}..{end} is invalid")]
    InvalidRange {
        code: &'static str,
        start: usize,
        end: usize,
    },

    #[error("code {0:?}: scale factor must be finite and non-zero")]
    InvalidScale(&'static str),

    #[error("metric {0} is mapped by more than one code")]
    DuplicateMetric(String),
}

/// Errors loading exporter configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;
