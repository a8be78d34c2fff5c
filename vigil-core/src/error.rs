//! Error types for Vigil

use thiserror::Error;

/// Result type alias for Vigil operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for Vigil operations
#[derive(Error, Debug)]
pub enum Error {
    /// No model credential is configured
    #[error("Vigil is not configured: set an API key with `vigil config set-key` or VIGIL_API_KEY")]
    NotConfigured,

    /// A referenced anomaly or conversation does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The remote model call failed
    #[error("Model API error: {message}")]
    Upstream {
        message: String,
        /// Whether retrying the same request may succeed
        transient: bool,
    },

    /// The model response violated the JSON contract
    #[error("Failed to parse model response: {0}")]
    Parse(String),

    /// The operation was cancelled by the caller
    #[error("Operation cancelled")]
    Cancelled,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Durable state could not be read or written
    #[error("Storage error: {0}")]
    Storage(String),
}

impl Error {
    /// Build a transient upstream error (rate limit, server error, timeout)
    pub fn transient(message: impl Into<String>) -> Self {
        Error::Upstream {
            message: message.into(),
            transient: true,
        }
    }

    /// Build a permanent upstream error (bad credential, bad request)
    pub fn permanent(message: impl Into<String>) -> Self {
        Error::Upstream {
            message: message.into(),
            transient: false,
        }
    }

    /// Check if retrying may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Upstream { transient: true, .. })
    }
}

#[cfg(feature = "database")]
impl From<vigil_db::Error> for Error {
    fn from(err: vigil_db::Error) -> Self {
        Error::Storage(err.to_string())
    }
}
