use std::path::PathBuf;

use reqwest::StatusCode;

/// Errors produced while resolving, downloading, caching or reading a dataset
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid URL: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("Cache index error: {0}")]
    IndexError(#[from] serde_json::Error),

    #[error("Request to {url} failed with status {status}")]
    Status { url: String, status: StatusCode },

    #[error("Downloaded {received} bytes, expected {expected}")]
    Truncated { expected: u64, received: u64 },

    #[error("No handler for scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    #[error("No endpoints available for {0}")]
    NoEndpoint(String),

    #[error("Failed to commit {path:?} into the cache: {source}")]
    Commit {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Stream ended after {found} lines while replaying {expected}")]
    ReplayShortfall { expected: usize, found: usize },
}

impl DataError {
    /// Whether a failed request is worth repeating against the same endpoint
    pub fn is_transient(&self) -> bool {
        match self {
            DataError::Status { status, .. } => matches!(
                status.as_u16(),
                429 | 500 | 502 | 503 | 504
            ),
            DataError::HttpError(err) => err.is_connect() || err.is_timeout(),
            DataError::IoError(err) => matches!(
                err.kind(),
                std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }
}

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, DataError>;
