//! Line sources — where raw telegram lines come from.
//!
//! A source yields one `\n`-terminated line per call, delimiter included.
//! The last line of a replay file may lack the delimiter.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio_serial::{DataBits, Parity, SerialPortBuilderExt, SerialStream, StopBits};
use tracing::info;

use crate::error::{SourceError, SourceResult};

/// Longest chunk returned as one line; longer input is split.
pub const MAX_RAW_LINE: usize = 4096;

/// P1 line speed for DSMR 4 and later meters.
pub const P1_BAUD_RATE: u32 = 115_200;

/// Anything that can hand out telegram lines.
pub trait LineSource: Send {
    /// Read the next line.
    ///
    /// `Ok(None)` means end of stream; an `Err` is a read failure. Both are
    /// terminal for the ingestion loop.
    fn next_line(&mut self) -> impl Future<Output = SourceResult<Option<Vec<u8>>>> + Send;
}

/// Delay policy between reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    /// Block on the device; the meter sets the cadence.
    Live,
    /// Sleep between lines to approximate a live meter when replaying.
    Fixed(Duration),
}

/// Line source over any buffered async reader.
pub struct ReaderSource<R> {
    reader: R,
    pacing: Pacing,
    started: bool,
}

impl<R> ReaderSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    pub fn new(reader: R, pacing: Pacing) -> Self {
        Self {
            reader,
            pacing,
            started: false,
        }
    }
}

impl<R> LineSource for ReaderSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn next_line(&mut self) -> SourceResult<Option<Vec<u8>>> {
        if let Pacing::Fixed(delay) = self.pacing {
            if self.started {
                tokio::time::sleep(delay).await;
            }
        }
        self.started = true;

        let mut line = Vec::new();
        let n = (&mut self.reader)
            .take(MAX_RAW_LINE as u64)
            .read_until(b'\n', &mut line)
            .await?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(line))
    }
}

/// Open a P1 serial port at 115200 baud, 8N1.
///
/// Reads go through the reactor, so a silent meter never pins a blocking
/// thread and shutdown can drop a pending read.
pub async fn open_serial(path: &Path) -> SourceResult<ReaderSource<BufReader<SerialStream>>> {
    let port = tokio_serial::new(path.to_string_lossy(), P1_BAUD_RATE)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .open_native_async()
        .map_err(|source| SourceError::Serial {
            path: path.display().to_string(),
            source,
        })?;
    info!(device = %path.display(), baud = P1_BAUD_RATE, "serial port opened");
    Ok(ReaderSource::new(BufReader::new(port), Pacing::Live))
}

/// Open a recorded telegram file for replay (test mode).
pub async fn open_replay(
    path: &Path,
    interval: Duration,
) -> SourceResult<ReaderSource<BufReader<File>>> {
    let file = open(path).await?;
    info!(
        file = %path.display(),
        interval_ms = interval.as_millis() as u64,
        "replay file opened (test mode)"
    );
    Ok(ReaderSource::new(BufReader::new(file), Pacing::Fixed(interval)))
}

async fn open(path: &Path) -> SourceResult<File> {
    File::open(path).await.map_err(|source| SourceError::Open {
        path: path.display().to_string(),
        source,
    })
}
