//! Error types for the portalfs-crypto crate

use thiserror::Error;

/// Result type alias using `AccessError`
pub type Result<T> = std::result::Result<T, AccessError>;

/// Errors raised by access providers and the primitives beneath them
#[derive(Error, Debug)]
pub enum AccessError {
    /// Missing or invalid provider configuration
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Access condition could not be parsed or is structurally invalid
    #[error("invalid access condition: {0}")]
    InvalidCondition(String),

    /// Encryption failed
    #[error("encryption failed (domain {domain}, ritual {ritual_id}): {reason}")]
    Encryption {
        domain: String,
        ritual_id: u32,
        reason: String,
    },

    /// Decryption failed for a reason other than access denial
    #[error("decryption failed (domain {domain}): {reason}")]
    Decryption { domain: String, reason: String },

    /// The requester does not satisfy the access condition
    #[error("access denied (domain {domain}): {reason}")]
    AccessDenied { domain: String, reason: String },

    /// Malformed ciphertext or message kit
    #[error("invalid ciphertext: {0}")]
    InvalidCiphertext(String),

    /// Invalid key material
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Signature verification failed
    #[error("signature verification failed")]
    SignatureVerification,

    /// Invalid nonce
    #[error("invalid nonce: {0}")]
    InvalidNonce(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Base64 decode error
    #[error("base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),

    /// Hex decode error
    #[error("hex decode error: {0}")]
    HexDecode(#[from] hex::FromHexError),
}

impl AccessError {
    /// Whether this error means the condition was evaluated and not satisfied
    pub fn is_access_denied(&self) -> bool {
        matches!(self, Self::AccessDenied { .. })
    }
}

impl From<serde_json::Error> for AccessError {
    fn from(err: serde_json::Error) -> Self {
        AccessError::Serialization(err.to_string())
    }
}
