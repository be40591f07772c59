//! Raw capture — tees every line read to a file for later replay.

use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::error::{SourceError, SourceResult};

pub struct CaptureSink {
    path: PathBuf,
    /// `None` once a write has failed.
    file: Option<File>,
}

impl CaptureSink {
    /// Open `path` for appending, creating it if needed.
    pub async fn create(path: &Path) -> SourceResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(|source| SourceError::Capture {
                path: path.display().to_string(),
                source,
            })?;
        info!(path = %path.display(), "capturing raw telegram lines");
        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
        })
    }

    /// Append one raw line. A failed write disables the sink.
    pub async fn write(&mut self, line: &[u8]) {
        let Some(file) = self.file.as_mut() else {
            return;
        };
        let result = async {
            file.write_all(line).await?;
            file.flush().await
        }
        .await;
        if let Err(e) = result {
            warn!(path = %self.path.display(), error = %e, "capture write failed, capture disabled");
            self.file = None;
        }
    }

    pub fn is_active(&self) -> bool {
        self.file.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn appends_raw_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dsmr.txt");
        std::fs::write(&path, b"previous\n").unwrap();

        let mut sink = CaptureSink::create(&path).await.unwrap();
        sink.write(b"1-0:1.7.0(01.193*kW)\r\n").await;
        sink.write(b"!6F4A\r\n").await;
        assert!(sink.is_active());

        let content = std::fs::read(&path).unwrap();
        assert_eq!(content, b"previous\n1-0:1.7.0(01.193*kW)\r\n!6F4A\r\n");
    }

    #[tokio::test]
    async fn create_fails_for_missing_directory() {
        let err = CaptureSink::create(Path::new("/nonexistent/dir/dsmr.txt"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, SourceError::Capture { .. }));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn failed_write_disables_sink() {
        let mut sink = CaptureSink::create(Path::new("/dev/full")).await.unwrap();
        assert!(sink.is_active());

        sink.write(b"1-0:1.7.0(01.193*kW)\r\n").await;
        assert!(!sink.is_active());

        // Further writes are no-ops.
        sink.write(b"!6F4A\r\n").await;
        assert!(!sink.is_active());
    }
}
