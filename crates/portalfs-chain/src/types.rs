//! Chain types: ABI values, receipts, decoded events and portal contract names

use serde::{Deserialize, Serialize};
use std::fmt;

/// Function names of the portal registry and portal contracts
pub mod functions {
    /// Registry: `mint(namespace, metadataRef, ownerKey)`
    pub const MINT: &str = "mint";
    /// Portal: `addFile(metadataRef, contentRef, gateRef, fileType, version)`
    pub const ADD_FILE: &str = "addFile";
    /// Portal: `editFile(fileId, metadataRef, contentRef, gateRef, fileType, version)`
    pub const EDIT_FILE: &str = "editFile";
    /// Portal: `files(fileId) -> (metadataRef, contentRef, gateRef, fileType, version)`
    pub const FILES: &str = "files";
    /// Portal: `getFileCount() -> uint`
    pub const GET_FILE_COUNT: &str = "getFileCount";
    /// Portal: `owner() -> address`
    pub const OWNER: &str = "owner";
}

/// On-chain access semantics of a file
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileType {
    Public = 0,
    Private = 1,
    Gated = 2,
    MemberPrivate = 3,
}

impl FileType {
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Public),
            1 => Some(Self::Private),
            2 => Some(Self::Gated),
            3 => Some(Self::MemberPrivate),
            _ => None,
        }
    }
}

/// A transaction hash (`0x`-prefixed hex)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHash(pub String);

impl TxHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A value passed to or returned from a contract function
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum AbiValue {
    Address(String),
    Uint(u128),
    String(String),
    Bool(bool),
    Bytes(Vec<u8>),
}

impl AbiValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) | Self::Address(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_uint(&self) -> Option<u128> {
        match self {
            Self::Uint(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<&str> for AbiValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for AbiValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<u64> for AbiValue {
    fn from(value: u64) -> Self {
        Self::Uint(u128::from(value))
    }
}

impl From<u8> for AbiValue {
    fn from(value: u8) -> Self {
        Self::Uint(u128::from(value))
    }
}

/// Raw log entry
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
}

/// Events the portal contracts emit, decoded
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum DecodedEvent {
    Mint {
        #[serde(rename = "portalAddress")]
        portal_address: String,
        owner: String,
        namespace: String,
    },
    AddedFile {
        #[serde(rename = "fileId")]
        file_id: u64,
    },
    EditedFile {
        #[serde(rename = "fileId")]
        file_id: u64,
    },
}

/// Transaction receipt after confirmation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: TxHash,
    /// Block number where the transaction was included
    pub block_number: u64,
    /// Whether the transaction was successful
    pub success: bool,
    pub logs: Vec<LogEntry>,
    pub events: Vec<DecodedEvent>,
}

impl TxReceipt {
    /// `portalAddress` of the first `Mint` event
    pub fn minted_portal(&self) -> Option<&str> {
        self.events.iter().find_map(|event| match event {
            DecodedEvent::Mint { portal_address, .. } => Some(portal_address.as_str()),
            _ => None,
        })
    }

    /// `fileId` of the first `AddedFile` event
    pub fn added_file_id(&self) -> Option<u64> {
        self.events.iter().find_map(|event| match event {
            DecodedEvent::AddedFile { file_id } => Some(*file_id),
            _ => None,
        })
    }

    /// `fileId` of the first `EditedFile` event
    pub fn edited_file_id(&self) -> Option<u64> {
        self.events.iter().find_map(|event| match event {
            DecodedEvent::EditedFile { file_id } => Some(*file_id),
            _ => None,
        })
    }
}

/// A file record as stored by a portal
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub metadata_ipfs_hash: String,
    pub content_ipfs_hash: String,
    pub gate_ipfs_hash: String,
    pub file_type: u8,
    pub version: u64,
}

impl FileRecord {
    /// Whether every field holds its zero value (no record stored)
    pub fn is_empty(&self) -> bool {
        self.metadata_ipfs_hash.is_empty()
            && self.content_ipfs_hash.is_empty()
            && self.gate_ipfs_hash.is_empty()
            && self.file_type == 0
            && self.version == 0
    }

    /// Encode as the tuple `files(fileId)` returns
    pub fn to_abi(&self) -> Vec<AbiValue> {
        vec![
            AbiValue::String(self.metadata_ipfs_hash.clone()),
            AbiValue::String(self.content_ipfs_hash.clone()),
            AbiValue::String(self.gate_ipfs_hash.clone()),
            AbiValue::Uint(u128::from(self.file_type)),
            AbiValue::Uint(u128::from(self.version)),
        ]
    }

    /// Decode the tuple `files(fileId)` returns
    pub fn from_abi(values: &[AbiValue]) -> Option<Self> {
        match values {
            [metadata, content, gate, file_type, version] => Some(Self {
                metadata_ipfs_hash: metadata.as_str()?.to_string(),
                content_ipfs_hash: content.as_str()?.to_string(),
                gate_ipfs_hash: gate.as_str()?.to_string(),
                file_type: u8::try_from(file_type.as_uint()?).ok()?,
                version: u64::try_from(version.as_uint()?).ok()?,
            }),
            _ => None,
        }
    }
}
