//! Error types for multidl

use thiserror::Error;

/// Main error type for multidl operations
#[derive(Debug, Error)]
pub enum MultidlError {
    #[error("Unknown source: {0}")]
    UnknownSource(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Unsupported manifest format: {0}")]
    UnsupportedManifest(String),

    #[error("Manifest error: {0}")]
    Manifest(String),

    #[error("{0} not available - install it or set its path in the config")]
    ToolNotFound(String),

    #[error("{tool} failed for {source_name}: {message}")]
    ToolFailed {
        tool: String,
        source_name: String,
        message: String,
    },

    #[error("Timeout error: {0}")]
    Timeout(String),

    #[error("Authentication required: {0}")]
    AuthRequired(String),

    #[error("{0} does not support authentication")]
    AuthUnsupported(String),

    #[error("Invalid cookie file: {0}")]
    InvalidCookieFile(String),

    #[error("A download is already in progress")]
    InFlight,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Generic error: {0}")]
    Generic(String),
}

impl MultidlError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MultidlError::ToolFailed { .. } | MultidlError::Timeout(_) | MultidlError::Http(_)
        )
    }

    /// Check if error means the user has to (re)authenticate
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            MultidlError::AuthRequired(_) | MultidlError::AuthUnsupported(_)
        )
    }
}
