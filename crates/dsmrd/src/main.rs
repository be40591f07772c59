//! dsmrd — the DSMR P1 exporter daemon.
//!
//! Reads telegram lines from a smart meter's P1 port (or a recorded file in
//! test mode), keeps the latest readings, and serves them for Prometheus.
//!
//! # Usage
//!
//! ```text
//! dsmrd --serial-port /dev/ttyUSB0 --listen-address :9602
//! dsmrd --replay-file telegrams.txt --replay-interval-ms 50
//! dsmrd --config /etc/dsmr.toml
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};

use dsmr_core::config::{SourceConfig, WebConfig};
use dsmr_core::{DispatchTable, ExporterConfig, Settings, SourceMode};
use dsmr_ingest::{open_replay, open_serial, CaptureSink, IngestLoop, LineSource, StopReason};
use dsmr_metrics::MetricState;

#[derive(Parser, Debug)]
#[command(name = "dsmrd", about = "DSMR P1 smart meter exporter", version)]
struct Cli {
    /// TOML config file; flags given here override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Serial device connected to the P1 port.
    #[arg(long, alias = "serial.port", conflicts_with = "replay_file")]
    serial_port: Option<PathBuf>,

    /// Test mode: replay a recorded telegram file instead of a device.
    #[arg(long)]
    replay_file: Option<PathBuf>,

    /// Delay between replayed lines, in milliseconds.
    #[arg(long)]
    replay_interval_ms: Option<u64>,

    /// Append every raw line read to this file.
    #[arg(long)]
    capture_file: Option<PathBuf>,

    /// Address to serve metrics on (`host:port` or `:port`).
    #[arg(long, alias = "web.listen-address")]
    listen_address: Option<String>,

    /// Path under which to expose metrics.
    #[arg(long, alias = "web.telemetry-path")]
    telemetry_path: Option<String>,
}

impl Cli {
    fn overrides(&self) -> ExporterConfig {
        ExporterConfig {
            source: SourceConfig {
                serial_port: self.serial_port.clone(),
                replay_file: self.replay_file.clone(),
                replay_interval_ms: self.replay_interval_ms,
                capture_file: self.capture_file.clone(),
            },
            web: WebConfig {
                listen_address: self.listen_address.clone(),
                telemetry_path: self.telemetry_path.clone(),
            },
        }
    }

    fn settings(&self) -> anyhow::Result<Settings> {
        let base = match &self.config {
            Some(path) => ExporterConfig::from_file(path)?,
            None => ExporterConfig::default(),
        };
        Ok(base.merge(self.overrides()).resolve()?)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,dsmrd=debug,dsmr_ingest=debug")),
        )
        .init();

    let cli = Cli::parse();
    let settings = cli.settings().context("invalid configuration")?;
    run(settings).await
}

async fn run(settings: Settings) -> anyhow::Result<()> {
    info!("DSMR exporter starting");

    let table = DispatchTable::try_dsmr().context("invalid built-in dispatch table")?;
    let metrics = Arc::new(MetricState::new(&table));
    info!(metrics = metrics.tracked_metrics().count(), "tracking meter readings");

    let capture = match &settings.capture_file {
        Some(path) => Some(CaptureSink::create(path).await?),
        None => None,
    };

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Start ingestion ────────────────────────────────────────

    let ingest_handle = match &settings.source {
        SourceMode::Serial(device) => {
            let source = open_serial(device).await?;
            spawn_ingest(source, table, metrics.clone(), capture, shutdown_rx)
        }
        SourceMode::Replay { path, interval } => {
            warn!(file = %path.display(), "running in replay test mode, not reading a meter");
            let source = open_replay(path, *interval).await?;
            spawn_ingest(source, table, metrics.clone(), capture, shutdown_rx)
        }
    };

    // ── Start metrics server ───────────────────────────────────

    let router = dsmr_api::build_router(metrics, &settings.telemetry_path);
    let listener = tokio::net::TcpListener::bind(settings.listen_address)
        .await
        .with_context(|| format!("failed to bind {}", settings.listen_address))?;

    info!(
        addr = %settings.listen_address,
        path = %settings.telemetry_path,
        "serving metrics"
    );

    // Graceful shutdown on Ctrl-C.
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    // Wait for ingestion to wind down.
    match ingest_handle.await {
        Ok(reason) => info!(%reason, "ingestion finished"),
        Err(e) => warn!(error = %e, "ingestion task failed"),
    }

    info!("DSMR exporter stopped");
    Ok(())
}

fn spawn_ingest<S>(
    source: S,
    table: DispatchTable,
    metrics: Arc<MetricState>,
    capture: Option<CaptureSink>,
    shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<StopReason>
where
    S: LineSource + 'static,
{
    let mut ingest = IngestLoop::new(source, table, metrics);
    if let Some(sink) = capture {
        ingest = ingest.with_capture(sink);
    }
    tokio::spawn(ingest.run(shutdown))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn cli_device_and_replay_conflict() {
        let err = Cli::try_parse_from([
            "dsmrd",
            "--serial-port",
            "/dev/ttyUSB0",
            "--replay-file",
            "t.txt",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn cli_accepts_legacy_flag_names() {
        let cli = Cli::try_parse_from([
            "dsmrd",
            "--serial.port",
            "/dev/ttyUSB0",
            "--web.listen-address",
            ":9100",
            "--web.telemetry-path",
            "/p1",
        ])
        .unwrap();

        let settings = cli.settings().unwrap();
        assert_eq!(settings.source, SourceMode::Serial(PathBuf::from("/dev/ttyUSB0")));
        assert_eq!(settings.listen_address.port(), 9100);
        assert_eq!(settings.telemetry_path, "/p1");
    }

    #[test]
    fn cli_requires_a_source() {
        let cli = Cli::try_parse_from(["dsmrd"]).unwrap();
        assert!(cli.settings().is_err());
    }

    #[test]
    fn cli_serial_defaults() {
        let cli = Cli::try_parse_from(["dsmrd", "--serial-port", "/dev/ttyUSB0"]).unwrap();
        let settings = cli.settings().unwrap();
        assert_eq!(settings.source, SourceMode::Serial(PathBuf::from("/dev/ttyUSB0")));
        assert_eq!(settings.listen_address.port(), 9602);
        assert_eq!(settings.telemetry_path, "/metrics");
        assert!(settings.capture_file.is_none());
    }

    #[test]
    fn cli_overrides_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[source]\nreplay_file = \"old.txt\"\nreplay_interval_ms = 5\n\n[web]\nlisten_address = \":9000\"\ntelemetry_path = \"/p1\"\n"
        )
        .unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let cli = Cli::try_parse_from([
            "dsmrd",
            "--config",
            path.as_str(),
            "--replay-file",
            "new.txt",
            "--listen-address",
            "127.0.0.1:9100",
        ])
        .unwrap();

        let settings = cli.settings().unwrap();
        assert_eq!(
            settings.source,
            SourceMode::Replay {
                path: PathBuf::from("new.txt"),
                interval: Duration::from_millis(5),
            }
        );
        assert_eq!(settings.listen_address.to_string(), "127.0.0.1:9100");
        assert_eq!(settings.telemetry_path, "/p1");
    }
}
