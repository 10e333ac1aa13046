//! # Portalfs Storage
//!
//! Content-addressed storage for portalfs file blobs.
//!
//! This crate provides:
//! - **StorageProvider**: the upload/download/unpin contract the file orchestrator relies on
//! - **PinataStorage**: IPFS storage through the Pinata pinning API and a gateway
//! - **MemoryStorage**: in-process storage computing real CIDs, for development and tests
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            File Orchestrator            │
//! ├─────────────────────────────────────────┤
//! │          StorageProvider Trait          │
//! ├────────────────────┬────────────────────┤
//! │   PinataStorage    │   MemoryStorage    │
//! ├────────────────────┼────────────────────┤
//! │  Pinata API + IPFS │      DashMap       │
//! └────────────────────┴────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use portalfs_storage::{MemoryStorage, StorageProvider};
//!
//! let storage = MemoryStorage::new();
//! let reference = storage.upload("note.md", "Hello World".into()).await?;
//! let bytes = storage.download_bytes(&reference).await?;
//! ```

pub mod cid_utils;
pub mod error;
pub mod memory;
pub mod pinata;

pub use cid_utils::{cid_from_reference, create_cid, reference_for};
pub use error::{Result, StorageError};
pub use memory::MemoryStorage;
pub use pinata::{PinataConfig, PinataStorage};

use async_trait::async_trait;
use bytes::Bytes;

/// Protocol prefix of IPFS references
pub const IPFS_PROTOCOL: &str = "ipfs://";

/// Blob content as returned by `download`
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlobData {
    /// Content the backend identified as text
    Text(String),
    /// Binary content
    Bytes(Bytes),
}

impl BlobData {
    /// Decode to text, failing on invalid UTF-8
    pub fn into_text(self) -> Result<String> {
        match self {
            Self::Text(text) => Ok(text),
            Self::Bytes(bytes) => String::from_utf8(bytes.to_vec())
                .map_err(|e| StorageError::InvalidData(format!("blob is not UTF-8: {}", e))),
        }
    }

    pub fn into_bytes(self) -> Bytes {
        match self {
            Self::Text(text) => Bytes::from(text),
            Self::Bytes(bytes) => bytes,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Bytes(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of a `download`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Downloaded {
    pub data: BlobData,
}

/// Trait for content-addressed storage backends
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Store a blob and return its protocol-prefixed reference
    async fn upload(&self, file_name: &str, content: Bytes) -> Result<String>;

    /// Fetch a blob, as text when the backend identifies it as such
    async fn download(&self, reference: &str) -> Result<Downloaded>;

    /// Fetch a blob as raw bytes
    async fn download_bytes(&self, reference: &str) -> Result<Bytes>;

    /// Stop pinning a blob; fails with `StorageError::Unpin` when it is not pinned.
    ///
    /// The pin is dropped outright, even when several uploads produced the same CID.
    /// Callers must not unpin a reference that is still in use elsewhere.
    async fn unpin(&self, reference: &str) -> Result<String>;

    /// Protocol prefix of the references this backend hands out
    async fn protocol(&self) -> Result<String>;

    /// Whether the backend is reachable and authenticated
    async fn is_connected(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_text_decoding() {
        let text = BlobData::Bytes(Bytes::from_static(b"Hello World"));
        assert_eq!(text.into_text().unwrap(), "Hello World");

        let binary = BlobData::Bytes(Bytes::from_static(&[0xff, 0xfe, 0x00]));
        assert!(matches!(binary.into_text(), Err(StorageError::InvalidData(_))));
    }

    #[test]
    fn test_blob_into_bytes() {
        let blob = BlobData::Text("abc".to_string());
        assert_eq!(blob.len(), 3);
        assert_eq!(blob.into_bytes(), Bytes::from_static(b"abc"));
    }
}
