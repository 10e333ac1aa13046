//! In-memory storage provider for development and testing

use crate::{
    cid_utils::{cid_from_reference, create_cid, reference_for},
    BlobData, Downloaded, Result, StorageError, StorageProvider, IPFS_PROTOCOL,
};
use async_trait::async_trait;
use bytes::Bytes;
use cid::Cid;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Default)]
struct Counters {
    uploads: AtomicUsize,
    downloads: AtomicUsize,
    unpins: AtomicUsize,
}

/// An in-memory, content-addressed blob store
#[derive(Clone)]
pub struct MemoryStorage {
    blobs: Arc<DashMap<Cid, Bytes>>,
    counters: Arc<Counters>,
    connected: Arc<AtomicBool>,
    fail_unpin: Arc<AtomicBool>,
    download_delay: Option<Duration>,
}

impl MemoryStorage {
    /// Create a new empty memory store
    pub fn new() -> Self {
        Self {
            blobs: Arc::new(DashMap::new()),
            counters: Arc::new(Counters::default()),
            connected: Arc::new(AtomicBool::new(true)),
            fail_unpin: Arc::new(AtomicBool::new(false)),
            download_delay: None,
        }
    }

    /// Delay every download (to exercise caller timeouts)
    pub fn with_download_delay(mut self, delay: Duration) -> Self {
        self.download_delay = Some(delay);
        self
    }

    /// Get the number of blobs stored
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// Whether a reference is currently pinned
    pub fn contains(&self, reference: &str) -> bool {
        cid_from_reference(reference)
            .map(|cid| self.blobs.contains_key(&cid))
            .unwrap_or(false)
    }

    /// Make every subsequent `unpin` fail
    pub fn set_fail_unpin(&self, fail: bool) {
        self.fail_unpin.store(fail, Ordering::SeqCst);
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn upload_count(&self) -> usize {
        self.counters.uploads.load(Ordering::SeqCst)
    }

    pub fn download_count(&self) -> usize {
        self.counters.downloads.load(Ordering::SeqCst)
    }

    pub fn unpin_count(&self) -> usize {
        self.counters.unpins.load(Ordering::SeqCst)
    }

    async fn fetch(&self, reference: &str) -> Result<Bytes> {
        self.counters.downloads.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.download_delay {
            tokio::time::sleep(delay).await;
        }
        let cid = cid_from_reference(reference)?;
        self.blobs
            .get(&cid)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StorageError::NotFound(reference.to_string()))
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageProvider for MemoryStorage {
    async fn upload(&self, file_name: &str, content: Bytes) -> Result<String> {
        self.counters.uploads.fetch_add(1, Ordering::SeqCst);
        let cid = create_cid(&content);
        debug!(file_name, cid = %cid, size = content.len(), "Stored blob");
        self.blobs.insert(cid, content);
        Ok(reference_for(&cid))
    }

    async fn download(&self, reference: &str) -> Result<Downloaded> {
        let bytes = self.fetch(reference).await?;
        let data = match std::str::from_utf8(&bytes) {
            Ok(text) => BlobData::Text(text.to_string()),
            Err(_) => BlobData::Bytes(bytes),
        };
        Ok(Downloaded { data })
    }

    async fn download_bytes(&self, reference: &str) -> Result<Bytes> {
        self.fetch(reference).await
    }

    async fn unpin(&self, reference: &str) -> Result<String> {
        self.counters.unpins.fetch_add(1, Ordering::SeqCst);
        if self.fail_unpin.load(Ordering::SeqCst) {
            return Err(StorageError::Unpin(format!("{}: backend refused", reference)));
        }
        let cid = cid_from_reference(reference)
            .map_err(|e| StorageError::Unpin(e.to_string()))?;
        self.blobs
            .remove(&cid)
            .map(|_| cid.to_string())
            .ok_or_else(|| StorageError::Unpin(format!("{} is not pinned", reference)))
    }

    async fn protocol(&self) -> Result<String> {
        Ok(IPFS_PROTOCOL.to_string())
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_and_download() {
        let store = MemoryStorage::new();

        let reference = store
            .upload("note.md", Bytes::from_static(b"Hello World"))
            .await
            .unwrap();
        assert!(reference.starts_with(IPFS_PROTOCOL));

        let downloaded = store.download(&reference).await.unwrap();
        assert_eq!(downloaded.data, BlobData::Text("Hello World".to_string()));
        assert_eq!(store.upload_count(), 1);
    }

    #[tokio::test]
    async fn test_binary_download() {
        let store = MemoryStorage::new();
        let payload = Bytes::from_static(&[0x50, 0x46, 0xff, 0x00]);

        let reference = store.upload("blob", payload.clone()).await.unwrap();

        assert_eq!(
            store.download(&reference).await.unwrap().data,
            BlobData::Bytes(payload.clone())
        );
        assert_eq!(store.download_bytes(&reference).await.unwrap(), payload);
    }

    #[tokio::test]
    async fn test_content_addressing() {
        let store = MemoryStorage::new();

        let a = store.upload("a", Bytes::from_static(b"same")).await.unwrap();
        let b = store.upload("b", Bytes::from_static(b"same")).await.unwrap();

        assert_eq!(a, b);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_unpin() {
        let store = MemoryStorage::new();
        let reference = store.upload("x", Bytes::from_static(b"x")).await.unwrap();

        store.unpin(&reference).await.unwrap();
        assert!(!store.contains(&reference));
        assert!(matches!(
            store.download(&reference).await,
            Err(StorageError::NotFound(_))
        ));

        // Already gone
        assert!(matches!(
            store.unpin(&reference).await,
            Err(StorageError::Unpin(_))
        ));
    }

    #[tokio::test]
    async fn test_failing_unpin() {
        let store = MemoryStorage::new();
        let reference = store.upload("x", Bytes::from_static(b"x")).await.unwrap();
        store.set_fail_unpin(true);

        assert!(store.unpin(&reference).await.is_err());
        assert!(store.contains(&reference));
        assert_eq!(store.unpin_count(), 1);
    }
}
