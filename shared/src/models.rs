/// Data models shared across all Courier crates.
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::errors::{FetchError, FetchResult};
use crate::http_protocol::UNKNOWN_CONTENT_LENGTH;

/// One resource to fetch and the file its body is written to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Target {
    pub url: Url,
    pub output_path: PathBuf,
}

impl Target {
    /// Parse `url` and pair it with an output path.
    ///
    /// Only plain `http` URLs with a host are accepted.
    pub fn new(url: &str, output_path: impl Into<PathBuf>) -> FetchResult<Self> {
        let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        if parsed.scheme() != "http" {
            return Err(FetchError::InvalidUrl {
                url: url.to_string(),
                reason: format!("unsupported scheme `{}`", parsed.scheme()),
            });
        }
        if parsed.host_str().map_or(true, str::is_empty) {
            return Err(FetchError::InvalidUrl {
                url: url.to_string(),
                reason: "missing host".to_string(),
            });
        }

        Ok(Self {
            url: parsed,
            output_path: output_path.into(),
        })
    }
}

/// Terminal status of a download.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    Done,
    Failed,
}

impl std::fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DownloadStatus::Done => write!(f, "done"),
            DownloadStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Outcome of one download, produced once it reaches a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadReport {
    pub id: Uuid,
    pub target: Target,
    pub status: DownloadStatus,
    /// Body bytes written to the output file.
    pub bytes_written: u64,
    /// Declared `Content-Length`, `-1` when absent or unparseable.
    pub content_length: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl DownloadReport {
    pub fn done(
        id: Uuid,
        target: Target,
        bytes_written: u64,
        content_length: i64,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            target,
            status: DownloadStatus::Done,
            bytes_written,
            content_length,
            error_kind: None,
            error_message: None,
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn failed(
        id: Uuid,
        target: Target,
        kind: &str,
        message: String,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            target,
            status: DownloadStatus::Failed,
            bytes_written: 0,
            content_length: UNKNOWN_CONTENT_LENGTH,
            error_kind: Some(kind.to_string()),
            error_message: Some(message),
            started_at,
            finished_at: Utc::now(),
        }
    }

    /// Build a failed report from a fetch error.
    pub fn from_error(
        id: Uuid,
        target: Target,
        err: &FetchError,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self::failed(id, target, err.kind(), err.to_string(), started_at)
    }

    /// Record how far a download got before it ended.
    pub fn with_progress(mut self, bytes_written: u64, content_length: i64) -> Self {
        self.bytes_written = bytes_written;
        self.content_length = content_length;
        self
    }

    pub fn is_done(&self) -> bool {
        self.status == DownloadStatus::Done
    }

    /// Wall-clock time between start and terminal state, in milliseconds.
    pub fn elapsed_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}
