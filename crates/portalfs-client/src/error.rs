//! Agent error types

use portalfs_chain::ChainError;
use portalfs_crypto::AccessError;
use portalfs_storage::StorageError;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, AgentError>;

/// Errors returned by `Agent` operations.
///
/// Messages carry the file id, operation and domain where known, never key
/// material or condition-context tokens.
#[derive(Error, Debug)]
pub enum AgentError {
    /// Invalid or missing construction parameters
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An access condition was given but no access provider is configured
    #[error("{operation}: an access condition requires a configured access provider")]
    ProviderRequired { operation: &'static str },

    /// Invalid file id, content or options
    #[error("validation error: {0}")]
    Validation(String),

    /// The access provider failed to encrypt
    #[error("{operation}: encryption failed: {reason}")]
    Encryption {
        operation: &'static str,
        reason: String,
    },

    /// The access provider failed to decrypt for a reason other than access denial
    #[error("decryption of file {file_id} failed: {reason}")]
    Decryption { file_id: u64, reason: String },

    /// The requester does not satisfy the file's access condition
    #[error("access to file {file_id} denied: {reason}")]
    AccessDenied { file_id: u64, reason: String },

    /// The chain accepted the call but the expected event or record is missing
    #[error("{operation}: registration failed: {reason}")]
    Registration {
        operation: &'static str,
        reason: String,
    },

    /// The operation needs a provisioned portal
    #[error("portal is not set up; call setup() first")]
    NotSetup,

    /// Best-effort cleanup failure (logged, never returned by file operations)
    #[error("unpin of {reference} failed: {reason}")]
    Unpin { reference: String, reason: String },

    /// A storage download exceeded its time bound
    #[error("storage download of {reference} timed out after {seconds}s")]
    StorageTimeout { reference: String, seconds: u64 },

    /// Storage transport failure
    #[error("storage error: {0}")]
    Storage(StorageError),

    /// Chain transport or contract failure
    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    /// Local credential persistence failure
    #[error("credentials error: {0}")]
    Credentials(String),
}

/// Discriminant of `AgentError`, for branching without matching on fields
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Configuration,
    ProviderRequired,
    Validation,
    Encryption,
    Decryption,
    AccessDenied,
    Registration,
    NotSetup,
    Unpin,
    StorageTimeout,
    Storage,
    Chain,
    Credentials,
}

impl AgentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::ProviderRequired { .. } => ErrorKind::ProviderRequired,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Encryption { .. } => ErrorKind::Encryption,
            Self::Decryption { .. } => ErrorKind::Decryption,
            Self::AccessDenied { .. } => ErrorKind::AccessDenied,
            Self::Registration { .. } => ErrorKind::Registration,
            Self::NotSetup => ErrorKind::NotSetup,
            Self::Unpin { .. } => ErrorKind::Unpin,
            Self::StorageTimeout { .. } => ErrorKind::StorageTimeout,
            Self::Storage(_) => ErrorKind::Storage,
            Self::Chain(_) => ErrorKind::Chain,
            Self::Credentials(_) => ErrorKind::Credentials,
        }
    }

    /// Check if this is an access denied error
    pub fn is_access_denied(&self) -> bool {
        matches!(self, Self::AccessDenied { .. })
    }

    /// Translate an access provider failure during encryption
    pub(crate) fn from_encrypt(operation: &'static str, err: AccessError) -> Self {
        match err {
            AccessError::Configuration(reason) => Self::Configuration(reason),
            other => Self::Encryption {
                operation,
                reason: other.to_string(),
            },
        }
    }

    /// Translate an access provider failure during decryption
    pub(crate) fn from_decrypt(file_id: u64, err: AccessError) -> Self {
        match err {
            AccessError::AccessDenied { reason, .. } => Self::AccessDenied { file_id, reason },
            AccessError::Configuration(reason) => Self::Configuration(reason),
            other => Self::Decryption {
                file_id,
                reason: other.to_string(),
            },
        }
    }
}

impl From<StorageError> for AgentError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Timeout { seconds } => Self::StorageTimeout {
                reference: "<in flight>".to_string(),
                seconds,
            },
            StorageError::Unpin(reason) => Self::Unpin {
                reference: String::new(),
                reason,
            },
            other => Self::Storage(other),
        }
    }
}
