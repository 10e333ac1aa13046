//! Access provider capability trait
//!
//! The file orchestrator depends only on this trait. Concrete backends are
//! selected by constructor injection.

use crate::{condition::AccessCondition, context::ConditionContext, Result};
use async_trait::async_trait;
use serde_json::Value;

/// An encryption backend that gates decryption behind access conditions
#[async_trait]
pub trait AccessProvider: Send + Sync {
    /// Stable identifier of the backend
    fn provider_type(&self) -> &str;

    /// Whether the backend can encrypt at all
    fn supports_encryption(&self) -> bool;

    /// Check that the backend is usable.
    ///
    /// Returns `AccessError::Configuration` describing what is wrong. Safe to
    /// call repeatedly.
    async fn validate_config(&self) -> Result<bool>;

    /// Encrypt `content` so only principals satisfying `condition` can read it
    async fn encrypt(&self, content: &[u8], condition: &AccessCondition) -> Result<Vec<u8>>;

    /// Decrypt `ciphertext`, deriving the condition context when none is given.
    ///
    /// Returns `AccessError::AccessDenied` when the condition is not satisfied.
    async fn decrypt(
        &self,
        ciphertext: &[u8],
        context: Option<&ConditionContext>,
    ) -> Result<Vec<u8>>;

    /// Public provider configuration (never secrets)
    fn config(&self) -> Value;

    /// Minimal configuration recorded in file metadata (never secrets)
    fn metadata_config(&self) -> Value;
}
