//! Error types for the portalfs-chain crate

use thiserror::Error;

/// Result type alias using `ChainError`
pub type Result<T> = std::result::Result<T, ChainError>;

/// Errors reported by chain clients
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    /// Call reverted or was rejected by the contract
    #[error("contract error: {0}")]
    Contract(String),

    /// Arguments do not match the function signature
    #[error("invalid arguments for {function}: {reason}")]
    InvalidArguments { function: String, reason: String },

    #[error("caller {caller} is not allowed to call {function}")]
    Unauthorized { caller: String, function: String },

    #[error("transaction failed: {0}")]
    TransactionFailed(String),

    #[error("receipt not found for transaction {0}")]
    ReceiptNotFound(String),
}
