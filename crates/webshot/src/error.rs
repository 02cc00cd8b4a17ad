//! Preview Error Types

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub type PreviewResult<T> = Result<T, PreviewError>;

#[derive(Error, Debug)]
pub enum PreviewError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("excluded filename extension '{0}'")]
    ExcludedType(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("render of '{url}' timed out after {}s", .after.as_secs())]
    Timeout { url: String, after: Duration },

    #[error("no data received for '{0}'")]
    NoData(String),

    #[error("failed to write '{}': {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("render backend fault for '{url}': {message}")]
    BackendFault { url: String, message: String },

    #[error("Chrome browser error: {0}")]
    Chrome(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PreviewError {
    /// Whether this error came from the render deadline expiring.
    pub fn is_timeout(&self) -> bool {
        matches!(self, PreviewError::Timeout { .. })
    }
}

impl From<reqwest::Error> for PreviewError {
    fn from(e: reqwest::Error) -> Self {
        PreviewError::Network(e.to_string())
    }
}
