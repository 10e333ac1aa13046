//! Error types for the portalfs-storage crate

use thiserror::Error;

/// Result type alias using `StorageError`
pub type Result<T> = std::result::Result<T, StorageError>;

/// Default timeout reported when the HTTP client gives up
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;

/// Errors that can occur during storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    /// Nothing is stored under the reference
    #[error("content not found: {0}")]
    NotFound(String),

    /// Reference is not protocol-prefixed or does not hold a valid CID
    #[error("invalid reference: {0}")]
    InvalidReference(String),

    /// Stored bytes could not be interpreted as requested
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Upload rejected by the backend
    #[error("upload failed: {0}")]
    Upload(String),

    /// Unpin failed or the target was not pinned
    #[error("unpin failed: {0}")]
    Unpin(String),

    /// Timeout error
    #[error("operation timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// Connection error
    #[error("connection error: {0}")]
    Connection(String),

    /// HTTP error
    #[error("http error: {0}")]
    Http(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl StorageError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl From<reqwest::Error> for StorageError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            StorageError::Timeout {
                seconds: DEFAULT_HTTP_TIMEOUT_SECS,
            }
        } else if err.is_connect() {
            StorageError::Connection(err.to_string())
        } else {
            StorageError::Http(err.to_string())
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}
