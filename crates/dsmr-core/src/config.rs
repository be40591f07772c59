//! Exporter configuration (`dsmr.toml`).
//!
//! Every field is optional in the file; command-line flags are layered on
//! top with [`ExporterConfig::merge`] and the result is checked by
//! [`ExporterConfig::resolve`].

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ConfigError, ConfigResult};

pub const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0:9602";
pub const DEFAULT_TELEMETRY_PATH: &str = "/metrics";
pub const DEFAULT_REPLAY_INTERVAL_MS: u64 = 50;

/// Paths the HTTP surface reserves for itself.
const RESERVED_PATHS: [&str; 2] = ["/", "/healthz"];

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExporterConfig {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub web: WebConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    /// Serial device attached to the meter's P1 port.
    pub serial_port: Option<PathBuf>,
    /// Recorded telegram file, replayed for offline testing.
    pub replay_file: Option<PathBuf>,
    /// Delay between replayed lines.
    pub replay_interval_ms: Option<u64>,
    /// Append every raw line read to this file.
    pub capture_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WebConfig {
    pub listen_address: Option<String>,
    pub telemetry_path: Option<String>,
}

/// Where telegram lines come from.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceMode {
    /// Live device; reads block until the meter sends a line.
    Serial(PathBuf),
    /// Test mode: a capture file read with a fixed delay per line.
    Replay { path: PathBuf, interval: Duration },
}

/// Fully validated settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub source: SourceMode,
    pub capture_file: Option<PathBuf>,
    pub listen_address: SocketAddr,
    pub telemetry_path: String,
}

impl ExporterConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Layer `overrides` on top of `self`.
    ///
    /// A source given in `overrides` replaces the file's source choice as a
    /// whole, so a device on the command line wins over a replay file in
    /// the config and vice versa.
    pub fn merge(self, overrides: ExporterConfig) -> ExporterConfig {
        let source_overridden =
            overrides.source.serial_port.is_some() || overrides.source.replay_file.is_some();
        let (serial_port, replay_file) = if source_overridden {
            (overrides.source.serial_port, overrides.source.replay_file)
        } else {
            (self.source.serial_port, self.source.replay_file)
        };

        ExporterConfig {
            source: SourceConfig {
                serial_port,
                replay_file,
                replay_interval_ms: overrides
                    .source
                    .replay_interval_ms
                    .or(self.source.replay_interval_ms),
                capture_file: overrides.source.capture_file.or(self.source.capture_file),
            },
            web: WebConfig {
                listen_address: overrides.web.listen_address.or(self.web.listen_address),
                telemetry_path: overrides.web.telemetry_path.or(self.web.telemetry_path),
            },
        }
    }

    /// Validate and apply defaults.
    pub fn resolve(&self) -> ConfigResult<Settings> {
        let source = match (&self.source.serial_port, &self.source.replay_file) {
            (Some(dev), None) => SourceMode::Serial(dev.clone()),
            (None, Some(path)) => SourceMode::Replay {
                path: path.clone(),
                interval: Duration::from_millis(
                    self.source
                        .replay_interval_ms
                        .unwrap_or(DEFAULT_REPLAY_INTERVAL_MS),
                ),
            },
            (Some(_), Some(_)) => {
                return Err(ConfigError::Invalid(
                    "serial_port and replay_file are mutually exclusive".to_string(),
                ));
            }
            (None, None) => {
                return Err(ConfigError::Invalid(
                    "one of serial_port or replay_file is required".to_string(),
                ));
            }
        };

        let listen = self
            .web
            .listen_address
            .as_deref()
            .unwrap_or(DEFAULT_LISTEN_ADDRESS);
        let listen_address = parse_listen_address(listen)?;

        let telemetry_path = self
            .web
            .telemetry_path
            .clone()
            .unwrap_or_else(|| DEFAULT_TELEMETRY_PATH.to_string());
        if !telemetry_path.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "telemetry_path must start with '/': {telemetry_path}"
            )));
        }
        if RESERVED_PATHS.contains(&telemetry_path.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "telemetry_path {telemetry_path} is reserved"
            )));
        }

        Ok(Settings {
            source,
            capture_file: self.source.capture_file.clone(),
            listen_address,
            telemetry_path,
        })
    }
}

/// Accepts `host:port` and the `:port` shorthand for all interfaces.
fn parse_listen_address(addr: &str) -> ConfigResult<SocketAddr> {
    let full = if addr.starts_with(':') {
        format!("0.0.0.0{addr}")
    } else {
        addr.to_string()
    };
    full.parse()
        .map_err(|_| ConfigError::Invalid(format!("invalid listen_address: {addr}")))
}
