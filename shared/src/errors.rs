/// Unified error types for the Courier system.
use std::net::SocketAddr;

use thiserror::Error;

/// Top-level error type for run-level output.
#[derive(Debug, Error)]
pub enum CourierError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that end a single download. Local to one target, never fatal to the run.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Invalid URL `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Failed to resolve {host}: {reason}")]
    Resolution { host: String, reason: String },

    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to send request ({sent}/{total} bytes accepted): {reason}")]
    Send {
        sent: usize,
        total: usize,
        reason: String,
    },

    #[error("Failed to receive response: {source}")]
    Receive {
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed response: {reason}")]
    MalformedResponse { reason: String },

    #[error("Output file {path} failed: {source}")]
    Sink {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    /// Stable label for reports and log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::InvalidUrl { .. } => "invalid_url",
            FetchError::Resolution { .. } => "resolution",
            FetchError::Connect { .. } => "connect",
            FetchError::Send { .. } => "send",
            FetchError::Receive { .. } => "receive",
            FetchError::MalformedResponse { .. } => "malformed_response",
            FetchError::Sink { .. } => "sink",
        }
    }

    /// Whether the failure happened before a connection was established.
    pub fn is_pre_connect(&self) -> bool {
        matches!(self,
            FetchError::InvalidUrl { .. }
            | FetchError::Resolution { .. }
            | FetchError::Connect { .. }
        )
    }
}

/// Errors raised while reading configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} has invalid value `{value}`: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("No download targets configured")]
    NoTargets,
}

/// Result type alias for Courier operations.
pub type CourierResult<T> = Result<T, CourierError>;

/// Result type alias for a single download.
pub type FetchResult<T> = Result<T, FetchError>;
