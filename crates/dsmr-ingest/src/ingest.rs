//! Ingestion loop — drives source → decoder → metric state.
//!
//! Runs as a single background task for the life of the process. Per-line
//! decode problems are logged and skipped; end of stream or a read error
//! stops the loop for good. The metric state keeps its last values after
//! the loop stops.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use dsmr_core::{decode, DecodeOutcome, DispatchTable};
use dsmr_metrics::MetricState;

use crate::capture::CaptureSink;
use crate::source::LineSource;

/// Why the loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    EndOfStream,
    /// Carries the source error's message.
    ReadError(String),
    /// Process shutdown was requested.
    Shutdown,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::EndOfStream => f.write_str("end of stream"),
            StopReason::ReadError(e) => f.write_str(e),
            StopReason::Shutdown => f.write_str("shutdown"),
        }
    }
}

pub struct IngestLoop<S> {
    source: S,
    table: DispatchTable,
    state: Arc<MetricState>,
    capture: Option<CaptureSink>,
}

impl<S: LineSource> IngestLoop<S> {
    pub fn new(source: S, table: DispatchTable, state: Arc<MetricState>) -> Self {
        Self {
            source,
            table,
            state,
            capture: None,
        }
    }

    /// Tee every raw line to `sink` before decoding.
    pub fn with_capture(mut self, sink: CaptureSink) -> Self {
        self.capture = Some(sink);
        self
    }

    /// Decode one line and apply the result to the metric state.
    pub fn process_line(&self, line: &[u8]) -> DecodeOutcome {
        self.state.record_line();
        let outcome = decode(line, &self.table);
        match &outcome {
            DecodeOutcome::Update(update) => {
                self.state.apply(*update);
            }
            DecodeOutcome::ParseFailure { code, text } => {
                self.state.record_parse_failure();
                warn!(%code, %text, "malformed reading skipped");
            }
            DecodeOutcome::NoMatch => {}
        }
        outcome
    }

    /// Run until the source ends, fails, or `shutdown` fires.
    ///
    /// A closed shutdown channel counts as a shutdown request.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> StopReason {
        self.state.mark_running();
        info!(fields = self.table.fields().len(), "ingestion started");

        let reason = loop {
            let next = tokio::select! {
                next = self.source.next_line() => next,
                _ = shutdown.changed() => break StopReason::Shutdown,
            };

            match next {
                Ok(Some(line)) => {
                    if let Some(sink) = self.capture.as_mut() {
                        sink.write(&line).await;
                        if !sink.is_active() {
                            self.capture = None;
                        }
                    }
                    self.process_line(&line);
                }
                Ok(None) => break StopReason::EndOfStream,
                Err(e) => break StopReason::ReadError(e.to_string()),
            }
        };

        let counters = self.state.counters();
        match &reason {
            StopReason::Shutdown => info!(lines = counters.lines, "ingestion shutting down"),
            StopReason::EndOfStream => warn!(
                lines = counters.lines,
                "line source exhausted, ingestion stopped; serving last known readings"
            ),
            StopReason::ReadError(e) => error!(
                error = %e,
                lines = counters.lines,
                "line source failed, ingestion stopped; serving last known readings"
            ),
        }
        debug!(
            updates = counters.updates,
            parse_failures = counters.parse_failures,
            "ingestion totals"
        );

        self.state.mark_stopped(reason.to_string());
        reason
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    use dsmr_core::{Direction, MetricId, Tariff};
    use dsmr_metrics::IngestStatus;

    use crate::error::{SourceError, SourceResult};
    use crate::source::{Pacing, ReaderSource};

    const LOW: MetricId = MetricId::Energy {
        direction: Direction::Received,
        tariff: Tariff::Low,
    };

    /// Scripted source: yields each entry in turn, then end of stream.
    struct ScriptedSource {
        script: VecDeque<SourceResult<Vec<u8>>>,
    }

    impl ScriptedSource {
        fn new(script: Vec<SourceResult<Vec<u8>>>) -> Self {
            Self {
                script: script.into(),
            }
        }
    }

    impl LineSource for ScriptedSource {
        async fn next_line(&mut self) -> SourceResult<Option<Vec<u8>>> {
            match self.script.pop_front() {
                Some(entry) => entry.map(Some),
                None => Ok(None),
            }
        }
    }

    fn ingest<S: LineSource>(source: S) -> (IngestLoop<S>, Arc<MetricState>) {
        let state = Arc::new(MetricState::default());
        (
            IngestLoop::new(source, DispatchTable::dsmr(), state.clone()),
            state,
        )
    }

    #[test]
    fn no_match_leaves_state_unchanged() {
        let (ingest, state) = ingest(ScriptedSource::new(Vec::new()));
        let before = state.snapshot().readings;

        for line in [&b""[..], b"\r\n", b"/ISk5\\2MT382-1000\r\n", b"0-0:96.14.0(0002)\r\n"] {
            assert_eq!(ingest.process_line(line), DecodeOutcome::NoMatch);
        }
        assert_eq!(state.snapshot().readings, before);
        assert_eq!(state.counters().lines, 4);
    }

    #[test]
    fn parse_failure_keeps_prior_reading() {
        let (ingest, state) = ingest(ScriptedSource::new(Vec::new()));
        ingest.process_line(b"1-0:1.8.1(000123.456*kWh)\r\n");
        let before = state.get(&LOW).unwrap();

        let outcome = ingest.process_line(b"1-0:1.8.1(0001\r\n");
        assert!(matches!(outcome, DecodeOutcome::ParseFailure { .. }));
        assert_eq!(state.get(&LOW).unwrap(), before);
        assert_eq!(state.counters().parse_failures, 1);
    }

    #[tokio::test]
    async fn parse_failure_does_not_stop_later_fields() {
        let (ingest, state) = ingest(ScriptedSource::new(vec![
            Ok(b"1-0:1.8.1(00xx23.456*kWh)\r\n".to_vec()),
            Ok(b"1-0:1.8.2(000054.321*kWh)\r\n".to_vec()),
            Ok(b"1-0:1.7.0(01.193*kW)\r\n".to_vec()),
        ]));
        let (_tx, rx) = watch::channel(false);

        assert_eq!(ingest.run(rx).await, StopReason::EndOfStream);
        assert!(state.get(&LOW).is_none());
        assert_eq!(
            state
                .get(&MetricId::Energy {
                    direction: Direction::Received,
                    tariff: Tariff::High
                })
                .unwrap()
                .value,
            54321.0
        );
        assert_eq!(
            state
                .get(&MetricId::Power {
                    direction: Direction::Received
                })
                .unwrap()
                .value,
            1193.0
        );
    }

    #[tokio::test]
    async fn end_of_stream_stops_and_keeps_values() {
        let source = ReaderSource::new(
            &b"1-0:1.8.1(000123.456*kWh)\r\n0-1:24.2.1(101209112500W)(00012.345*m3)\r\n"[..],
            Pacing::Live,
        );
        let (ingest, state) = ingest(source);
        let (_tx, rx) = watch::channel(false);

        let reason = ingest.run(rx).await;
        assert_eq!(reason, StopReason::EndOfStream);
        assert_eq!(state.ingest_status(), IngestStatus::Stopped("end of stream".to_string()));
        assert_eq!(state.get(&LOW).unwrap().value, 123456.0);
        assert_eq!(state.get(&MetricId::Gas).unwrap().value, 12_345_000.0);
    }

    #[tokio::test]
    async fn read_error_is_terminal() {
        let (ingest, state) = ingest(ScriptedSource::new(vec![
            Ok(b"1-0:1.7.0(01.193*kW)\r\n".to_vec()),
            Err(SourceError::Read(std::io::Error::other("device disconnected"))),
            Ok(b"1-0:1.7.0(02.000*kW)\r\n".to_vec()),
        ]));
        let (_tx, rx) = watch::channel(false);

        let reason = ingest.run(rx).await;
        assert_eq!(
            reason,
            StopReason::ReadError("read error: device disconnected".to_string())
        );
        assert!(!state.ingest_status().is_running());
        // The line after the error is never read.
        let power = MetricId::Power {
            direction: Direction::Received,
        };
        assert_eq!(state.get(&power).unwrap().value, 1193.0);
    }

    #[tokio::test]
    async fn shutdown_stops_blocked_loop() {
        struct Pending;
        impl LineSource for Pending {
            async fn next_line(&mut self) -> SourceResult<Option<Vec<u8>>> {
                std::future::pending().await
            }
        }

        let (ingest, state) = ingest(Pending);
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(ingest.run(rx));

        tx.send(true).unwrap();
        assert_eq!(handle.await.unwrap(), StopReason::Shutdown);
        assert_eq!(state.ingest_status(), IngestStatus::Stopped("shutdown".to_string()));
    }

    #[tokio::test]
    async fn capture_receives_every_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.txt");
        let sink = CaptureSink::create(&path).await.unwrap();

        let data = b"/ISk5\\2MT382-1000\r\n1-0:1.7.0(01.193*kW)\r\n!6F4A\r\n";
        let (ingest, _state) = ingest(ReaderSource::new(&data[..], Pacing::Live));
        let (_tx, rx) = watch::channel(false);
        ingest.with_capture(sink).run(rx).await;

        assert_eq!(std::fs::read(&path).unwrap(), data);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn capture_failure_does_not_stop_ingestion() {
        let sink = CaptureSink::create(std::path::Path::new("/dev/full")).await.unwrap();
        let (ingest, state) = ingest(ScriptedSource::new(vec![
            Ok(b"1-0:1.7.0(01.193*kW)\r\n".to_vec()),
            Ok(b"1-0:2.7.0(00.500*kW)\r\n".to_vec()),
        ]));
        let (_tx, rx) = watch::channel(false);

        assert_eq!(ingest.with_capture(sink).run(rx).await, StopReason::EndOfStream);
        let delivered = MetricId::Power {
            direction: Direction::Delivered,
        };
        assert_eq!(state.get(&delivered).unwrap().value, 500.0);
        assert_eq!(state.counters().updates, 2);
    }

    #[cfg(unix)]
    #[test]
    fn shutdown_on_silent_serial_port_releases_runtime() {
        use tokio_serial::{SerialPort, SerialStream};

        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .unwrap();

        // The master end stays open and never writes.
        let (reason, _master) = rt.block_on(async {
            let (master, slave) = SerialStream::pair().unwrap();
            let device = slave.name().unwrap();
            drop(slave);

            let source = crate::source::open_serial(std::path::Path::new(&device))
                .await
                .unwrap();
            let (ingest, _state) = ingest(source);
            let (tx, rx) = watch::channel(false);
            let handle = tokio::spawn(ingest.run(rx));

            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            tx.send(true).unwrap();
            (handle.await.unwrap(), master)
        });
        assert_eq!(reason, StopReason::Shutdown);

        let (done_tx, done_rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            drop(rt);
            let _ = done_tx.send(());
        });
        assert!(
            done_rx.recv_timeout(std::time::Duration::from_secs(5)).is_ok(),
            "runtime teardown waited on the serial read"
        );
    }

    #[test]
    fn stop_reason_display() {
        assert_eq!(StopReason::EndOfStream.to_string(), "end of stream");
        assert_eq!(StopReason::Shutdown.to_string(), "shutdown");
        assert_eq!(
            StopReason::ReadError("read error: boom".to_string()).to_string(),
            "read error: boom"
        );
    }
}
