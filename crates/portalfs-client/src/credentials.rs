//! Portal credential persistence
//!
//! `setup` stores one record per `<namespace>-<chain>` key so a second run
//! reuses the portal instead of minting a new one.

use crate::error::{AgentError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use portalfs_crypto::SigningIdentity;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Key under which a portal's credentials are stored
pub fn credential_key(namespace: &str, chain_name: &str) -> String {
    format!("{}-{}", namespace, chain_name)
}

/// Portal owner key pair, hex encoded
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalKeys {
    pub owner_public_key: String,
    pub owner_secret_key: String,
}

impl PortalKeys {
    /// Generate a fresh ed25519 owner key pair
    pub fn generate() -> Self {
        let identity = SigningIdentity::generate();
        Self {
            owner_public_key: hex::encode(identity.public_key()),
            owner_secret_key: hex::encode(identity.secret_bytes()),
        }
    }

    /// Restore the signing identity
    pub fn identity(&self) -> Result<SigningIdentity> {
        SigningIdentity::from_hex(&self.owner_secret_key)
            .map_err(|e| AgentError::Credentials(format!("invalid owner key: {}", e)))
    }
}

impl std::fmt::Debug for PortalKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortalKeys")
            .field("owner_public_key", &self.owner_public_key)
            .field("owner_secret_key", &"[REDACTED]")
            .finish()
    }
}

/// Everything needed to act on a provisioned portal
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalCredentials {
    pub portal_address: String,
    pub owner: String,
    pub namespace: String,
    pub metadata_ref: String,
    pub keys: PortalKeys,
    pub verifiers: Vec<String>,
}

/// Storage for portal credentials
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Load credentials, `None` when nothing was stored under `key`
    async fn load(&self, key: &str) -> Result<Option<PortalCredentials>>;

    /// Store credentials, replacing any previous record
    async fn save(&self, key: &str, credentials: &PortalCredentials) -> Result<()>;
}

/// JSON files under a directory, one per key
#[derive(Clone, Debug)]
pub struct FileCredentialStore {
    dir: PathBuf,
}

impl FileCredentialStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record for `key`
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self, key: &str) -> Result<Option<PortalCredentials>> {
        let path = self.path_for(key);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(AgentError::Credentials(format!(
                    "failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        let credentials = serde_json::from_slice(&raw).map_err(|e| {
            AgentError::Credentials(format!("corrupt credentials in {}: {}", path.display(), e))
        })?;
        debug!(path = %path.display(), "Loaded portal credentials");
        Ok(Some(credentials))
    }

    async fn save(&self, key: &str, credentials: &PortalCredentials) -> Result<()> {
        let path = self.path_for(key);
        let io_err =
            |e: std::io::Error| AgentError::Credentials(format!("{}: {}", path.display(), e));

        tokio::fs::create_dir_all(&self.dir).await.map_err(io_err)?;
        let json = serde_json::to_vec_pretty(credentials)
            .map_err(|e| AgentError::Credentials(e.to_string()))?;

        // Holds the owner secret key: written owner-only, then renamed into place
        let staging = path.with_extension("json.tmp");
        match tokio::fs::remove_file(&staging).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(io_err(e)),
            _ => {}
        }
        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        options.mode(0o600);
        let mut file = options.open(&staging).await.map_err(io_err)?;
        file.write_all(&json).await.map_err(io_err)?;
        file.sync_all().await.map_err(io_err)?;
        drop(file);
        tokio::fs::rename(&staging, &path).await.map_err(io_err)?;

        debug!(path = %path.display(), "Saved portal credentials");
        Ok(())
    }
}

/// In-memory credential store for tests
#[derive(Default)]
pub struct MemoryCredentialStore {
    records: Mutex<HashMap<String, PortalCredentials>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self, key: &str) -> Result<Option<PortalCredentials>> {
        Ok(self.records.lock().get(key).cloned())
    }

    async fn save(&self, key: &str, credentials: &PortalCredentials) -> Result<()> {
        self.records
            .lock()
            .insert(key.to_string(), credentials.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PortalCredentials {
        let keys = PortalKeys::generate();
        PortalCredentials {
            portal_address: "0x00000000000000000000000000000000000000aa".to_string(),
            owner: "0x00000000000000000000000000000000000000bb".to_string(),
            namespace: "notes".to_string(),
            metadata_ref: "ipfs://portal".to_string(),
            verifiers: vec![keys.owner_public_key.clone()],
            keys,
        }
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("creds"));
        let key = credential_key("notes", "gnosis");

        assert!(store.load(&key).await.unwrap().is_none());

        let credentials = sample();
        store.save(&key, &credentials).await.unwrap();

        assert!(store.path_for(&key).ends_with("notes-gnosis.json"));
        assert_eq!(store.load(&key).await.unwrap(), Some(credentials));
    }

    #[tokio::test]
    async fn test_file_store_wire_format() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path());
        store.save("notes-gnosis", &sample()).await.unwrap();

        let raw = std::fs::read(store.path_for("notes-gnosis")).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        for field in ["portalAddress", "owner", "namespace", "metadataRef", "keys", "verifiers"] {
            assert!(value.get(field).is_some(), "{field}");
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_saved_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path());
        let path = store.path_for("notes-gnosis");
        std::fs::write(&path, b"{}").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        store.save("notes-gnosis", &sample()).await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert!(!path.with_extension("json.tmp").exists());
        assert!(store.load("notes-gnosis").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path());
        std::fs::write(store.path_for("notes-gnosis"), b"{not json").unwrap();

        assert!(matches!(
            store.load("notes-gnosis").await,
            Err(AgentError::Credentials(_))
        ));
    }

    #[test]
    fn test_keys_restore_identity() {
        let keys = PortalKeys::generate();
        let identity = keys.identity().unwrap();

        assert_eq!(hex::encode(identity.public_key()), keys.owner_public_key);
        assert!(!format!("{:?}", keys).contains(&keys.owner_secret_key));
    }
}
