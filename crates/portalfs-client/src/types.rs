//! Request and result types of the agent

use chrono::{DateTime, Utc};
use portalfs_chain::FileType;
use portalfs_crypto::AccessCondition;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Content type recorded for text files
pub const TEXT_CONTENT_TYPE: &str = "text/markdown";

/// Content type recorded for structured JSON files
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// File content accepted by `create`/`update` and returned by `get_file_content`
#[derive(Clone, Debug, PartialEq)]
pub enum Content {
    Text(String),
    Json(Value),
}

impl Content {
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Text(_) => TEXT_CONTENT_TYPE,
            Self::Json(_) => JSON_CONTENT_TYPE,
        }
    }

    /// Text content, if this is text
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Json(_) => None,
        }
    }

    pub(crate) fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Text(text) => text.as_bytes().to_vec(),
            // Serializing a Value cannot fail
            Self::Json(value) => value.to_string().into_bytes(),
        }
    }
}

impl From<&str> for Content {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for Content {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Value> for Content {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

/// Metadata blob stored next to every file's content.
///
/// Every field defaults so partially written metadata still parses.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileMetadata {
    pub name: String,
    pub description: String,
    /// Whether the content blob is ciphertext
    pub encrypted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_access_config: Option<Value>,
    pub content_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Options of `create` and `update`
#[derive(Clone, Debug, Default)]
pub struct FileOptions {
    /// Encrypt under this condition; `None` stores the content in the clear
    pub access_condition: Option<AccessCondition>,
    pub name: Option<String>,
    pub description: Option<String>,
}

impl FileOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_access_condition(mut self, condition: impl Into<AccessCondition>) -> Self {
        self.access_condition = Some(condition.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Result of `create`
#[derive(Clone, Debug)]
pub struct CreateResult {
    pub file_id: u64,
    pub transaction_hash: String,
    pub portal_address: String,
    pub encrypted: bool,
    pub access_condition: Option<AccessCondition>,
}

/// Result of `update`
#[derive(Clone, Debug)]
pub struct UpdateResult {
    pub file_id: u64,
    pub transaction_hash: String,
    pub portal_address: String,
    pub encrypted: bool,
    pub access_condition: Option<AccessCondition>,
}

/// Result of `delete`
#[derive(Clone, Debug)]
pub struct DeleteResult {
    pub file_id: u64,
    pub transaction_hash: String,
    pub portal_address: String,
}

/// Result of `get_file`
#[derive(Clone, Debug)]
pub struct FileInfo {
    pub file_id: u64,
    pub metadata_ref: String,
    pub content_ref: String,
    pub metadata: FileMetadata,
    pub encrypted: bool,
    pub file_type: Option<FileType>,
    /// The record carries the deletion tombstone
    pub deleted: bool,
}

/// Result of `get_file_content`
#[derive(Clone, Debug)]
pub struct FileContent {
    pub file: FileInfo,
    pub content: Content,
    /// The content was decrypted by the access provider
    pub decrypted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_partial_metadata_parses() {
        let metadata: FileMetadata = serde_json::from_value(json!({ "name": "note" })).unwrap();

        assert_eq!(metadata.name, "note");
        assert!(!metadata.encrypted);
        assert!(metadata.data_access_config.is_none());
    }

    #[test]
    fn test_metadata_wire_names() {
        let metadata = FileMetadata {
            name: "note".to_string(),
            encrypted: true,
            data_access_config: Some(json!({ "provider": "threshold" })),
            content_type: TEXT_CONTENT_TYPE.to_string(),
            ..Default::default()
        };
        let value = serde_json::to_value(&metadata).unwrap();

        assert_eq!(value["encrypted"], json!(true));
        assert_eq!(value["dataAccessConfig"]["provider"], json!("threshold"));
        assert_eq!(value["contentType"], json!("text/markdown"));
        assert!(value.get("createdAt").is_none());
    }

    #[test]
    fn test_content_bytes() {
        assert_eq!(Content::from("hi").to_bytes(), b"hi");
        assert_eq!(Content::from(json!({ "a": 1 })).to_bytes(), br#"{"a":1}"#);
        assert_eq!(Content::from(json!([])).content_type(), JSON_CONTENT_TYPE);
    }
}
