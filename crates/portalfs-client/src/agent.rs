//! File lifecycle orchestrator
//!
//! Every mutating operation runs its steps strictly in order: validate,
//! optionally encrypt, upload content, upload metadata, then register on
//! chain. A failure part-way leaves orphaned blobs behind; nothing is rolled
//! back.

use crate::config::AgentConfig;
use crate::credentials::{
    credential_key, CredentialStore, FileCredentialStore, PortalCredentials, PortalKeys,
};
use crate::error::{AgentError, Result};
use crate::types::{
    Content, CreateResult, DeleteResult, FileContent, FileInfo, FileMetadata, FileOptions,
    UpdateResult, JSON_CONTENT_TYPE,
};
use crate::validation::{
    validate_access_condition, validate_content, validate_name, validate_storage_provider,
};
use bytes::Bytes;
use chrono::Utc;
use parking_lot::RwLock;
use portalfs_chain::{functions, AbiValue, ChainClient, FileRecord, FileType, TxHash, TxReceipt};
use portalfs_crypto::{AccessProvider, ConditionContext};
use portalfs_storage::{StorageError, StorageProvider};
use serde_json::json;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

/// Suffix of the tombstone written by `delete` (`<protocol>deleted`)
pub const DELETED_SENTINEL: &str = "deleted";

const DEFAULT_FILE_NAME: &str = "untitled";

/// Content blob plus the metadata describing it, ready for upload
struct Sealed {
    payload: Bytes,
    metadata: FileMetadata,
    file_type: FileType,
}

/// Orchestrates files across storage, the portal contract and an optional
/// access provider.
///
/// Collaborators are shared, long-lived handles. The agent does not serialize
/// concurrent mutations: callers must serialize `update`/`delete` calls per
/// file id themselves, otherwise only on-chain transaction ordering decides
/// which write wins.
pub struct Agent {
    config: AgentConfig,
    chain: Arc<dyn ChainClient>,
    storage: Arc<dyn StorageProvider>,
    access: Option<Arc<dyn AccessProvider>>,
    credentials: Arc<dyn CredentialStore>,
    portal: RwLock<Option<PortalCredentials>>,
    provider_ready: OnceCell<()>,
}

impl Agent {
    /// Create an agent storing credentials under `config.credentials_dir`
    pub fn new(
        config: AgentConfig,
        chain: Arc<dyn ChainClient>,
        storage: Arc<dyn StorageProvider>,
    ) -> Result<Self> {
        config.validate()?;

        let chain_name = chain.chain_name().to_string();
        validate_name("chain name", &chain_name)
            .map_err(|e| AgentError::Configuration(e.to_string()))?;
        if let Some(expected) = &config.chain {
            if *expected != chain_name {
                return Err(AgentError::Configuration(format!(
                    "configured chain '{}' does not match chain client '{}'",
                    expected, chain_name
                )));
            }
        }
        if chain.account().trim().is_empty() {
            return Err(AgentError::Configuration(
                "chain client has no account".to_string(),
            ));
        }
        if let Some(namespace) = &config.namespace {
            validate_name("namespace", namespace)
                .map_err(|e| AgentError::Configuration(e.to_string()))?;
        }

        let credentials = Arc::new(FileCredentialStore::new(config.credentials_dir.clone()));
        Ok(Self {
            config,
            chain,
            storage,
            access: None,
            credentials,
            portal: RwLock::new(None),
            provider_ready: OnceCell::new(),
        })
    }

    /// Enable encrypted files through this provider
    pub fn with_access_provider(mut self, provider: Arc<dyn AccessProvider>) -> Self {
        self.access = Some(provider);
        self
    }

    /// Replace the credential store
    pub fn with_credential_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.credentials = store;
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// The provisioned portal, if `setup` has run
    pub fn portal(&self) -> Option<PortalCredentials> {
        self.portal.read().clone()
    }

    /// Provision the namespace from the configuration
    pub async fn setup_default(&self) -> Result<PortalCredentials> {
        let namespace = self.config.namespace.clone().ok_or_else(|| {
            AgentError::Configuration("no namespace configured".to_string())
        })?;
        self.setup(&namespace).await
    }

    /// Provision a portal for `namespace`, reusing persisted credentials when present
    #[instrument(skip(self), fields(chain = %self.chain.chain_name()))]
    pub async fn setup(&self, namespace: &str) -> Result<PortalCredentials> {
        validate_name("namespace", namespace)?;
        validate_storage_provider(self.storage.as_ref()).await?;

        let key = credential_key(namespace, self.chain.chain_name());
        if let Some(existing) = self.credentials.load(&key).await? {
            info!(portal = %existing.portal_address, "Reusing provisioned portal");
            *self.portal.write() = Some(existing.clone());
            return Ok(existing);
        }

        let keys = PortalKeys::generate();
        let owner = self.chain.account();
        let portal_metadata = json!({
            "namespace": namespace,
            "owner": owner,
            "ownerPublicKey": keys.owner_public_key,
            "createdAt": Utc::now().to_rfc3339(),
        });
        let metadata_ref = self
            .storage
            .upload(
                &format!("{}.portal.json", namespace),
                Bytes::from(portal_metadata.to_string()),
            )
            .await?;

        let receipt = self
            .transact(
                &self.chain.registry_address(),
                functions::MINT,
                vec![
                    namespace.into(),
                    metadata_ref.clone().into(),
                    keys.owner_public_key.clone().into(),
                ],
            )
            .await?;
        let portal_address = receipt
            .minted_portal()
            .ok_or_else(|| AgentError::Registration {
                operation: "setup",
                reason: format!("no Mint event in transaction {}", receipt.tx_hash),
            })?
            .to_string();

        let credentials = PortalCredentials {
            portal_address,
            owner,
            namespace: namespace.to_string(),
            metadata_ref,
            verifiers: vec![keys.owner_public_key.clone()],
            keys,
        };
        self.credentials.save(&key, &credentials).await?;
        info!(portal = %credentials.portal_address, "Provisioned portal");

        *self.portal.write() = Some(credentials.clone());
        Ok(credentials)
    }

    /// Fail fast when no portal is provisioned; returns the portal address
    pub fn prechecks(&self) -> Result<String> {
        self.portal
            .read()
            .as_ref()
            .map(|portal| portal.portal_address.clone())
            .ok_or(AgentError::NotSetup)
    }

    /// Number of files registered in the portal, tombstones included
    pub async fn file_count(&self) -> Result<u64> {
        let portal = self.prechecks()?;
        let values = self
            .chain
            .read_state(&portal, functions::GET_FILE_COUNT, Vec::new())
            .await?;
        values
            .first()
            .and_then(AbiValue::as_uint)
            .and_then(|count| u64::try_from(count).ok())
            .ok_or_else(|| AgentError::Registration {
                operation: "file_count",
                reason: "getFileCount returned no count".to_string(),
            })
    }

    /// Store a new file, encrypted when `options.access_condition` is set
    #[instrument(skip(self, content, options))]
    pub async fn create(
        &self,
        content: impl Into<Content>,
        options: FileOptions,
    ) -> Result<CreateResult> {
        let portal = self.prechecks()?;
        let content = content.into();
        validate_content(&content)?;
        let provider = self.gate(&options, "create")?;

        let sealed = self.seal(&content, &options, provider, "create").await?;
        let encrypted = sealed.metadata.encrypted;
        let file_type = sealed.file_type;
        let (metadata_ref, content_ref) = self.upload_sealed(sealed).await?;

        let receipt = self
            .transact(
                &portal,
                functions::ADD_FILE,
                file_args(None, metadata_ref, content_ref, file_type),
            )
            .await?;
        let file_id = receipt.added_file_id().ok_or_else(|| AgentError::Registration {
            operation: "create",
            reason: format!("no AddedFile event in transaction {}", receipt.tx_hash),
        })?;

        info!(file_id, encrypted, "File created");
        Ok(CreateResult {
            file_id,
            transaction_hash: receipt.tx_hash.to_string(),
            portal_address: portal,
            encrypted,
            access_condition: options.access_condition,
        })
    }

    /// Read a file's record and metadata
    #[instrument(skip(self))]
    pub async fn get_file(&self, file_id: u64) -> Result<FileInfo> {
        let portal = self.prechecks()?;
        let record = self.read_record(&portal, file_id, "get_file").await?;
        let deleted = self.is_tombstone(&record.metadata_ipfs_hash).await?;

        let metadata = if deleted {
            FileMetadata::default()
        } else {
            self.fetch_metadata(file_id, &record.metadata_ipfs_hash)
                .await?
        };

        Ok(FileInfo {
            file_id,
            encrypted: metadata.encrypted,
            metadata,
            file_type: FileType::from_u8(record.file_type),
            metadata_ref: record.metadata_ipfs_hash,
            content_ref: record.content_ipfs_hash,
            deleted,
        })
    }

    /// Read a file's content, decrypting it when the metadata says it is encrypted.
    ///
    /// Without a `context` the access provider derives one for its own signer.
    #[instrument(skip(self, context), fields(with_context = context.is_some()))]
    pub async fn get_file_content(
        &self,
        file_id: u64,
        context: Option<&ConditionContext>,
    ) -> Result<FileContent> {
        let file = self.get_file(file_id).await?;
        if file.deleted {
            return Err(AgentError::Registration {
                operation: "get_file_content",
                reason: format!("file {} has been deleted", file_id),
            });
        }

        let (content, decrypted) = if file.encrypted {
            let provider = self
                .access
                .as_ref()
                .ok_or(AgentError::ProviderRequired {
                    operation: "get_file_content",
                })?;
            let ciphertext = self
                .bounded(&file.content_ref, self.storage.download_bytes(&file.content_ref))
                .await?;
            let plaintext = provider
                .decrypt(&ciphertext, context)
                .await
                .map_err(|e| AgentError::from_decrypt(file_id, e))?;
            debug!(file_id, size = plaintext.len(), "Decrypted file content");
            (decode_content(plaintext, &file.metadata.content_type)?, true)
        } else {
            let downloaded = self
                .bounded(&file.content_ref, self.storage.download(&file.content_ref))
                .await?;
            let text = downloaded.data.into_text()?;
            (decode_content(text.into_bytes(), &file.metadata.content_type)?, false)
        };

        Ok(FileContent {
            file,
            content,
            decrypted,
        })
    }

    /// Replace a file's content.
    ///
    /// Without an access condition the new version is stored PUBLIC, even when
    /// the previous version was encrypted.
    #[instrument(skip(self, content, options))]
    pub async fn update(
        &self,
        file_id: u64,
        content: impl Into<Content>,
        options: FileOptions,
    ) -> Result<UpdateResult> {
        let portal = self.prechecks()?;
        let content = content.into();
        validate_content(&content)?;
        let provider = self.gate(&options, "update")?;

        let current = self.read_record(&portal, file_id, "update").await?;
        let sealed = self.seal(&content, &options, provider, "update").await?;
        let encrypted = sealed.metadata.encrypted;
        let file_type = sealed.file_type;
        if !encrypted && current.file_type == FileType::Private.as_u8() {
            warn!(
                file_id,
                "Update without an access condition stores a previously encrypted file as public"
            );
        }

        let (metadata_ref, content_ref) = self.upload_sealed(sealed).await?;
        let receipt = self
            .transact(
                &portal,
                functions::EDIT_FILE,
                file_args(
                    Some(file_id),
                    metadata_ref.clone(),
                    content_ref.clone(),
                    file_type,
                ),
            )
            .await?;

        self.unpin_stale(
            &portal,
            file_id,
            &[&current.metadata_ipfs_hash, &current.content_ipfs_hash],
            &[&metadata_ref, &content_ref],
        )
        .await;

        info!(file_id, encrypted, "File updated");
        Ok(UpdateResult {
            file_id,
            transaction_hash: receipt.tx_hash.to_string(),
            portal_address: portal,
            encrypted,
            access_condition: options.access_condition,
        })
    }

    /// Tombstone a file: both refs become `<protocol>deleted` and the old blobs are unpinned
    #[instrument(skip(self))]
    pub async fn delete(&self, file_id: u64) -> Result<DeleteResult> {
        let portal = self.prechecks()?;
        let current = self.read_record(&portal, file_id, "delete").await?;
        let sentinel = self.sentinel().await?;

        let receipt = self
            .transact(
                &portal,
                functions::EDIT_FILE,
                file_args(
                    Some(file_id),
                    sentinel.clone(),
                    sentinel.clone(),
                    FileType::Public,
                ),
            )
            .await?;

        self.unpin_stale(
            &portal,
            file_id,
            &[&current.metadata_ipfs_hash, &current.content_ipfs_hash],
            &[&sentinel],
        )
        .await;

        info!(file_id, "File deleted");
        Ok(DeleteResult {
            file_id,
            transaction_hash: receipt.tx_hash.to_string(),
            portal_address: portal,
        })
    }

    /// Resolve the provider for a gated operation before any I/O happens
    fn gate(
        &self,
        options: &FileOptions,
        operation: &'static str,
    ) -> Result<Option<&Arc<dyn AccessProvider>>> {
        let Some(condition) = &options.access_condition else {
            return Ok(None);
        };
        let provider = self
            .access
            .as_ref()
            .ok_or(AgentError::ProviderRequired { operation })?;
        validate_access_condition(condition)?;
        Ok(Some(provider))
    }

    /// Validate the provider once per agent; a failure is retried on the next call
    async fn ensure_provider_ready(&self, provider: &dyn AccessProvider) -> Result<()> {
        self.provider_ready
            .get_or_try_init(|| async {
                if !provider.supports_encryption() {
                    return Err(AgentError::Configuration(format!(
                        "access provider '{}' cannot encrypt",
                        provider.provider_type()
                    )));
                }
                match provider.validate_config().await {
                    Ok(true) => {
                        debug!(provider = provider.provider_type(), "Access provider validated");
                        Ok(())
                    }
                    Ok(false) => Err(AgentError::Configuration(format!(
                        "access provider '{}' rejected its configuration",
                        provider.provider_type()
                    ))),
                    Err(e) => Err(AgentError::Configuration(e.to_string())),
                }
            })
            .await?;
        Ok(())
    }

    async fn seal(
        &self,
        content: &Content,
        options: &FileOptions,
        provider: Option<&Arc<dyn AccessProvider>>,
        operation: &'static str,
    ) -> Result<Sealed> {
        let mut metadata = FileMetadata {
            name: options
                .name
                .clone()
                .unwrap_or_else(|| DEFAULT_FILE_NAME.to_string()),
            description: options.description.clone().unwrap_or_default(),
            encrypted: false,
            data_access_config: None,
            content_type: content.content_type().to_string(),
            created_at: Some(Utc::now()),
        };

        match (provider, &options.access_condition) {
            (Some(provider), Some(condition)) => {
                self.ensure_provider_ready(&**provider).await?;
                let ciphertext = provider
                    .encrypt(&content.to_bytes(), condition)
                    .await
                    .map_err(|e| AgentError::from_encrypt(operation, e))?;

                metadata.encrypted = true;
                metadata.data_access_config = Some(provider.metadata_config());
                Ok(Sealed {
                    payload: Bytes::from(ciphertext),
                    metadata,
                    file_type: FileType::Private,
                })
            }
            _ => Ok(Sealed {
                payload: Bytes::from(content.to_bytes()),
                metadata,
                file_type: FileType::Public,
            }),
        }
    }

    /// Upload content then metadata; returns `(metadata_ref, content_ref)`
    async fn upload_sealed(&self, sealed: Sealed) -> Result<(String, String)> {
        let name = &sealed.metadata.name;
        let content_name = if sealed.metadata.encrypted {
            format!("{}.enc", name)
        } else {
            name.clone()
        };
        let content_ref = self.storage.upload(&content_name, sealed.payload).await?;

        let metadata_json = serde_json::to_vec(&sealed.metadata).map_err(StorageError::from)?;
        let metadata_ref = self
            .storage
            .upload(&format!("{}.metadata.json", name), Bytes::from(metadata_json))
            .await?;

        debug!(content = %content_ref, metadata = %metadata_ref, "Uploaded file blobs");
        Ok((metadata_ref, content_ref))
    }

    async fn transact(
        &self,
        target: &str,
        function: &str,
        args: Vec<AbiValue>,
    ) -> Result<TxReceipt> {
        let tx_hash: TxHash = self.chain.submit_call(target, function, args).await?;
        debug!(tx = %tx_hash, function, "Submitted transaction");

        let receipt = self.chain.wait_for_receipt(&tx_hash).await?;
        if !receipt.success {
            return Err(AgentError::Registration {
                operation: "transaction",
                reason: format!("{} reverted in {}", function, tx_hash),
            });
        }
        Ok(receipt)
    }

    async fn read_record(
        &self,
        portal: &str,
        file_id: u64,
        operation: &'static str,
    ) -> Result<FileRecord> {
        let values = self
            .chain
            .read_state(portal, functions::FILES, vec![file_id.into()])
            .await?;
        let record = FileRecord::from_abi(&values).ok_or_else(|| AgentError::Registration {
            operation,
            reason: format!("malformed record for file {}", file_id),
        })?;
        if record.is_empty() {
            return Err(AgentError::Registration {
                operation,
                reason: format!("file {} not found", file_id),
            });
        }
        Ok(record)
    }

    /// Download and parse metadata; unparsable metadata degrades to empty
    async fn fetch_metadata(&self, file_id: u64, reference: &str) -> Result<FileMetadata> {
        let downloaded = self
            .bounded(reference, self.storage.download(reference))
            .await?;

        let parsed = downloaded
            .data
            .into_text()
            .map_err(|e| e.to_string())
            .and_then(|text| {
                serde_json::from_str::<FileMetadata>(&text).map_err(|e| e.to_string())
            });
        match parsed {
            Ok(metadata) => Ok(metadata),
            Err(reason) => {
                warn!(file_id, reference, %reason, "Unparsable file metadata, treating as empty");
                Ok(FileMetadata::default())
            }
        }
    }

    async fn sentinel(&self) -> Result<String> {
        let protocol = self.storage.protocol().await?;
        Ok(format!("{}{}", protocol, DELETED_SENTINEL))
    }

    async fn is_tombstone(&self, reference: &str) -> Result<bool> {
        Ok(reference == self.sentinel().await?)
    }

    /// Unpin replaced blobs; failures are logged and swallowed
    async fn unpin_stale(&self, portal: &str, file_id: u64, old: &[&String], current: &[&String]) {
        let sentinel = self.sentinel().await.ok();
        let mut stale: Vec<&str> = Vec::new();

        for reference in old.iter().map(|r| r.as_str()) {
            // Content addressing: an unchanged blob keeps the same reference
            if reference.is_empty()
                || sentinel.as_deref() == Some(reference)
                || current.iter().any(|c| c.as_str() == reference)
                || stale.contains(&reference)
            {
                continue;
            }
            stale.push(reference);
        }
        if stale.is_empty() {
            return;
        }

        // Identical content in another file resolves to the same reference
        let held = match self.references_outside(portal, file_id).await {
            Ok(held) => held,
            Err(e) => {
                warn!(file_id, error = %e, "Could not list live references, skipping unpin");
                return;
            }
        };

        for reference in stale {
            if held.contains(reference) {
                debug!(file_id, reference, "Blob still referenced by another file, keeping pin");
                continue;
            }
            match self.storage.unpin(reference).await {
                Ok(_) => debug!(file_id, reference, "Unpinned stale blob"),
                Err(e) => {
                    let err = AgentError::Unpin {
                        reference: reference.to_string(),
                        reason: e.to_string(),
                    };
                    warn!(file_id, error = %err, "Best-effort unpin failed");
                }
            }
        }
    }

    /// Refs held by every other record of the portal
    async fn references_outside(&self, portal: &str, file_id: u64) -> Result<HashSet<String>> {
        let mut held = HashSet::new();
        for other in (0..self.file_count().await?).filter(|id| *id != file_id) {
            let values = self
                .chain
                .read_state(portal, functions::FILES, vec![other.into()])
                .await?;
            if let Some(record) = FileRecord::from_abi(&values) {
                held.insert(record.metadata_ipfs_hash);
                held.insert(record.content_ipfs_hash);
            }
        }
        Ok(held)
    }

    /// Apply the download bound to a storage future
    async fn bounded<T>(
        &self,
        reference: &str,
        download: impl Future<Output = portalfs_storage::Result<T>>,
    ) -> Result<T> {
        let limit = self.config.download_timeout;
        match tokio::time::timeout(limit, download).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(StorageError::Timeout { seconds })) => Err(AgentError::StorageTimeout {
                reference: reference.to_string(),
                seconds,
            }),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => {
                warn!(reference, timeout_secs = limit.as_secs(), "Storage download timed out");
                Err(AgentError::StorageTimeout {
                    reference: reference.to_string(),
                    seconds: limit.as_secs(),
                })
            }
        }
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("chain", &self.chain.chain_name())
            .field("portal", &self.portal.read().as_ref().map(|p| p.portal_address.clone()))
            .field(
                "access_provider",
                &self.access.as_ref().map(|p| p.provider_type().to_string()),
            )
            .finish_non_exhaustive()
    }
}

/// `addFile(meta, content, gate, type, version)` or `editFile(id, ...)`
fn file_args(
    file_id: Option<u64>,
    metadata_ref: String,
    content_ref: String,
    file_type: FileType,
) -> Vec<AbiValue> {
    let mut args = Vec::with_capacity(6);
    if let Some(id) = file_id {
        args.push(id.into());
    }
    args.extend([
        metadata_ref.into(),
        content_ref.into(),
        AbiValue::String(String::new()),
        file_type.as_u8().into(),
        0u64.into(),
    ]);
    args
}

fn decode_content(bytes: Vec<u8>, content_type: &str) -> Result<Content> {
    let text = String::from_utf8(bytes).map_err(|e| {
        AgentError::Storage(StorageError::InvalidData(format!(
            "file content is not UTF-8: {}",
            e
        )))
    })?;
    if content_type == JSON_CONTENT_TYPE {
        if let Ok(value) = serde_json::from_str(&text) {
            return Ok(Content::Json(value));
        }
    }
    Ok(Content::Text(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_file_args_layout() {
        let add = file_args(None, "ipfs://m".into(), "ipfs://c".into(), FileType::Private);
        assert_eq!(add.len(), 5);
        assert_eq!(add[0].as_str(), Some("ipfs://m"));
        assert_eq!(add[2].as_str(), Some(""));
        assert_eq!(add[3].as_uint(), Some(1));
        assert_eq!(add[4].as_uint(), Some(0));

        let edit = file_args(Some(7), "ipfs://m".into(), "ipfs://c".into(), FileType::Public);
        assert_eq!(edit.len(), 6);
        assert_eq!(edit[0].as_uint(), Some(7));
        assert_eq!(edit[4].as_uint(), Some(0));
    }

    #[test]
    fn test_decode_content() {
        assert_eq!(
            decode_content(b"Hello".to_vec(), "text/markdown").unwrap(),
            Content::Text("Hello".to_string())
        );
        assert_eq!(
            decode_content(br#"{"a":1}"#.to_vec(), JSON_CONTENT_TYPE).unwrap(),
            Content::Json(json!({ "a": 1 }))
        );
        // Metadata lost: fall back to text
        assert_eq!(
            decode_content(br#"{"a":1}"#.to_vec(), "").unwrap(),
            Content::Text(r#"{"a":1}"#.to_string())
        );
        assert!(decode_content(vec![0xff, 0xfe], "").is_err());
    }
}
