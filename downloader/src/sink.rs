/// Output file for one download's body.
///
/// The file is created (truncating any previous content) only when the
/// response headers are complete, so a response that never gets that far
/// leaves no file behind.
use std::path::PathBuf;

use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use courier_shared::errors::{FetchError, FetchResult};

pub struct FileSink {
    path: PathBuf,
    file: Option<File>,
    written: u64,
}

impl FileSink {
    /// A sink bound to `path`. Nothing is touched on disk yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
            written: 0,
        }
    }

    /// Bytes appended since the file was opened.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Create or truncate the output file.
    pub async fn open(&mut self) -> FetchResult<()> {
        if self.file.is_some() {
            return Ok(());
        }
        let file = File::create(&self.path).await.map_err(|e| self.error(e))?;
        debug!("Opened output file {}", self.path.display());
        self.file = Some(file);
        Ok(())
    }

    /// Append `bytes` to the open file.
    pub async fn write(&mut self, bytes: &[u8]) -> FetchResult<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        let result = match self.file.as_mut() {
            Some(file) => file.write_all(bytes).await,
            None => Err(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "output file is not open",
            )),
        };
        result.map_err(|e| self.error(e))?;
        self.written += bytes.len() as u64;
        Ok(())
    }

    /// Flush and close the file. Calling this on a sink that never opened is a no-op.
    pub async fn close(&mut self) -> FetchResult<()> {
        let Some(mut file) = self.file.take() else {
            return Ok(());
        };
        if let Err(e) = file.flush().await {
            return Err(self.error(e));
        }
        if let Err(e) = file.sync_all().await {
            return Err(self.error(e));
        }
        Ok(())
    }

    /// Close on a failure path: errors are logged and dropped.
    pub async fn close_quietly(&mut self) {
        if let Err(e) = self.close().await {
            warn!("Ignoring error while closing output file: {}", e);
        }
    }

    fn error(&self, source: std::io::Error) -> FetchError {
        FetchError::Sink {
            path: self.path.display().to_string(),
            source,
        }
    }
}
