//! Input validation run before any storage or chain I/O

use crate::error::{AgentError, Result};
use crate::types::Content;
use portalfs_crypto::AccessCondition;
use portalfs_storage::StorageProvider;

const MAX_NAMESPACE_LEN: usize = 63;

/// Parse a file id supplied as text (e.g. from a CLI or URL)
pub fn parse_file_id(input: &str) -> Result<u64> {
    let input = input.trim();
    if input.is_empty() || !input.chars().all(|c| c.is_ascii_digit()) {
        return Err(AgentError::Validation(format!(
            "file id must be a non-negative integer, got '{}'",
            input
        )));
    }
    input
        .parse()
        .map_err(|_| AgentError::Validation(format!("file id '{}' is out of range", input)))
}

/// Content must be non-empty text or non-null JSON
pub fn validate_content(content: &Content) -> Result<()> {
    match content {
        Content::Text(text) if text.is_empty() => Err(AgentError::Validation(
            "content must not be empty".to_string(),
        )),
        Content::Json(value) if value.is_null() => Err(AgentError::Validation(
            "content must not be null".to_string(),
        )),
        _ => Ok(()),
    }
}

/// The orchestrator only checks the shape; the provider interprets the rest
pub fn validate_access_condition(condition: &AccessCondition) -> Result<()> {
    if condition.is_well_formed() {
        Ok(())
    } else {
        Err(AgentError::Validation(
            "access condition must be a non-empty JSON object".to_string(),
        ))
    }
}

/// Validate a namespace or chain name (used in credential file names and on-chain)
pub fn validate_name(kind: &str, name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_NAMESPACE_LEN {
        return Err(AgentError::Validation(format!(
            "{} must be between 1 and {} characters",
            kind, MAX_NAMESPACE_LEN
        )));
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(AgentError::Validation(format!(
            "{} can only contain lowercase letters, numbers, and hyphens",
            kind
        )));
    }

    if name.starts_with('-') || name.ends_with('-') {
        return Err(AgentError::Validation(format!(
            "{} cannot start or end with a hyphen",
            kind
        )));
    }

    Ok(())
}

/// Check that a storage provider hands out usable references and is reachable
pub async fn validate_storage_provider(storage: &dyn StorageProvider) -> Result<String> {
    let protocol = storage
        .protocol()
        .await
        .map_err(|e| AgentError::Configuration(format!("storage provider protocol: {}", e)))?;
    if !protocol.ends_with("://") || protocol.len() <= 3 {
        return Err(AgentError::Configuration(format!(
            "storage provider protocol '{}' is not of the form '<scheme>://'",
            protocol
        )));
    }
    if !storage.is_connected().await {
        return Err(AgentError::Configuration(
            "storage provider is not connected".to_string(),
        ));
    }
    Ok(protocol)
}
