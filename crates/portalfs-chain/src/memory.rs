//! In-memory portal registry
//!
//! `MemoryChain` plays both the registry contract and every portal it mints.
//! Transactions are confirmed immediately; submitted calls and reads are
//! recorded so tests can assert on what reached the chain.

use crate::{
    functions, AbiValue, ChainClient, ChainError, DecodedEvent, FileRecord, LogEntry, Result,
    TxHash, TxReceipt,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// A state-changing call as received by the chain
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmittedCall {
    pub target: String,
    pub function: String,
    pub args: Vec<AbiValue>,
}

#[derive(Clone, Debug)]
struct Portal {
    owner: String,
    namespace: String,
    metadata_ref: String,
    owner_key: String,
    files: Vec<FileRecord>,
}

#[derive(Default)]
struct ChainState {
    block_number: u64,
    tx_count: u64,
    portals: HashMap<String, Portal>,
    namespaces: HashMap<String, String>,
    receipts: HashMap<TxHash, TxReceipt>,
}

/// Portal registry and portals simulated in memory
#[derive(Clone)]
pub struct MemoryChain {
    name: String,
    account: String,
    registry: String,
    state: Arc<Mutex<ChainState>>,
    calls: Arc<Mutex<Vec<SubmittedCall>>>,
    reads: Arc<AtomicUsize>,
    emit_events: Arc<AtomicBool>,
}

impl MemoryChain {
    /// Create a chain named `name` whose transactions come from `account`
    pub fn new(name: impl Into<String>, account: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            registry: derive_address(&["registry", &name]),
            name,
            account: account.into().to_ascii_lowercase(),
            state: Arc::new(Mutex::new(ChainState::default())),
            calls: Arc::new(Mutex::new(Vec::new())),
            reads: Arc::new(AtomicUsize::new(0)),
            emit_events: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Whether receipts carry decoded events (off simulates a decoder miss)
    pub fn set_emit_events(&self, emit: bool) {
        self.emit_events.store(emit, Ordering::SeqCst);
    }

    /// Every state-changing call submitted so far
    pub fn calls(&self) -> Vec<SubmittedCall> {
        self.calls.lock().clone()
    }

    pub fn submitted_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn portal_count(&self) -> usize {
        self.state.lock().portals.len()
    }

    /// Stored record of a file, if the portal and file exist
    pub fn file(&self, portal: &str, file_id: u64) -> Option<FileRecord> {
        let state = self.state.lock();
        state
            .portals
            .get(&portal.to_ascii_lowercase())?
            .files
            .get(usize::try_from(file_id).ok()?)
            .cloned()
    }

    /// Owner key recorded when the portal was minted
    pub fn portal_owner_key(&self, portal: &str) -> Option<String> {
        let state = self.state.lock();
        state
            .portals
            .get(&portal.to_ascii_lowercase())
            .map(|p| p.owner_key.clone())
    }

    fn mint(&self, state: &mut ChainState, args: &[AbiValue]) -> Result<Vec<DecodedEvent>> {
        let (namespace, metadata_ref, owner_key) = match args {
            [namespace, metadata, key] => (
                string_arg(functions::MINT, namespace)?,
                string_arg(functions::MINT, metadata)?,
                string_arg(functions::MINT, key)?,
            ),
            _ => return Err(arity(functions::MINT, 3, args.len())),
        };
        if namespace.trim().is_empty() {
            return Err(ChainError::Contract("namespace must not be empty".to_string()));
        }
        if state.namespaces.contains_key(&namespace) {
            return Err(ChainError::Contract(format!(
                "namespace '{}' is already taken",
                namespace
            )));
        }

        let portal_address = derive_address(&[&self.registry, &namespace, &self.account]);
        state
            .namespaces
            .insert(namespace.clone(), portal_address.clone());
        state.portals.insert(
            portal_address.clone(),
            Portal {
                owner: self.account.clone(),
                namespace: namespace.clone(),
                metadata_ref,
                owner_key,
                files: Vec::new(),
            },
        );
        debug!(portal = %portal_address, namespace = %namespace, "Minted portal");

        Ok(vec![DecodedEvent::Mint {
            portal_address,
            owner: self.account.clone(),
            namespace,
        }])
    }

    fn portal_call(
        &self,
        state: &mut ChainState,
        target: &str,
        function: &str,
        args: &[AbiValue],
    ) -> Result<Vec<DecodedEvent>> {
        let portal = state
            .portals
            .get_mut(target)
            .ok_or_else(|| ChainError::Contract(format!("no contract at {}", target)))?;
        if portal.owner != self.account {
            return Err(ChainError::Unauthorized {
                caller: self.account.clone(),
                function: function.to_string(),
            });
        }

        match function {
            functions::ADD_FILE => {
                let record = match args {
                    [metadata, content, gate, file_type, version] => {
                        record_from_args(function, metadata, content, gate, file_type, version)?
                    }
                    _ => return Err(arity(function, 5, args.len())),
                };
                let file_id = portal.files.len() as u64;
                portal.files.push(record);
                Ok(vec![DecodedEvent::AddedFile { file_id }])
            }
            functions::EDIT_FILE => {
                let (file_id, record) = match args {
                    [id, metadata, content, gate, file_type, version] => (
                        uint_arg(function, id)?,
                        record_from_args(function, metadata, content, gate, file_type, version)?,
                    ),
                    _ => return Err(arity(function, 6, args.len())),
                };
                let slot = usize::try_from(file_id)
                    .ok()
                    .and_then(|index| portal.files.get_mut(index))
                    .ok_or_else(|| {
                        ChainError::Contract(format!("file {} does not exist", file_id))
                    })?;
                *slot = record;
                Ok(vec![DecodedEvent::EditedFile {
                    file_id: file_id as u64,
                }])
            }
            other => Err(ChainError::Contract(format!(
                "portal has no function '{}'",
                other
            ))),
        }
    }
}

#[async_trait]
impl ChainClient for MemoryChain {
    fn chain_name(&self) -> &str {
        &self.name
    }

    fn account(&self) -> String {
        self.account.clone()
    }

    fn registry_address(&self) -> String {
        self.registry.clone()
    }

    async fn submit_call(
        &self,
        target: &str,
        function: &str,
        args: Vec<AbiValue>,
    ) -> Result<TxHash> {
        let target = target.to_ascii_lowercase();
        self.calls.lock().push(SubmittedCall {
            target: target.clone(),
            function: function.to_string(),
            args: args.clone(),
        });

        let mut state = self.state.lock();
        let events = if target == self.registry && function == functions::MINT {
            self.mint(&mut state, &args)?
        } else {
            self.portal_call(&mut state, &target, function, &args)?
        };

        state.tx_count += 1;
        state.block_number += 1;
        let tx_hash = TxHash(format!(
            "0x{}",
            hex::encode(Sha256::digest(
                format!("{}:{}:{}", self.name, state.tx_count, function).as_bytes()
            ))
        ));

        let logs = events
            .iter()
            .map(|event| LogEntry {
                address: target.clone(),
                topics: vec![event_topic(event)],
                data: serde_json::to_string(event).unwrap_or_default(),
            })
            .collect();
        let events = if self.emit_events.load(Ordering::SeqCst) {
            events
        } else {
            Vec::new()
        };

        let receipt = TxReceipt {
            tx_hash: tx_hash.clone(),
            block_number: state.block_number,
            success: true,
            logs,
            events,
        };
        state.receipts.insert(tx_hash.clone(), receipt);
        debug!(tx = %tx_hash, function, "Transaction confirmed");
        Ok(tx_hash)
    }

    async fn wait_for_receipt(&self, tx_hash: &TxHash) -> Result<TxReceipt> {
        self.state
            .lock()
            .receipts
            .get(tx_hash)
            .cloned()
            .ok_or_else(|| ChainError::ReceiptNotFound(tx_hash.to_string()))
    }

    async fn read_state(
        &self,
        target: &str,
        function: &str,
        args: Vec<AbiValue>,
    ) -> Result<Vec<AbiValue>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock();
        let portal = state
            .portals
            .get(&target.to_ascii_lowercase())
            .ok_or_else(|| ChainError::Contract(format!("no contract at {}", target)))?;

        match function {
            functions::FILES => {
                let id = match args.as_slice() {
                    [id] => uint_arg(function, id)?,
                    _ => return Err(arity(function, 1, args.len())),
                };
                // Solidity mappings return zero values for unknown keys
                let record = usize::try_from(id)
                    .ok()
                    .and_then(|index| portal.files.get(index))
                    .cloned()
                    .unwrap_or_default();
                Ok(record.to_abi())
            }
            functions::GET_FILE_COUNT => Ok(vec![AbiValue::Uint(portal.files.len() as u128)]),
            functions::OWNER => Ok(vec![AbiValue::Address(portal.owner.clone())]),
            "namespace" => Ok(vec![AbiValue::String(portal.namespace.clone())]),
            "metadataRef" => Ok(vec![AbiValue::String(portal.metadata_ref.clone())]),
            other => Err(ChainError::Contract(format!(
                "portal has no view '{}'",
                other
            ))),
        }
    }
}

impl std::fmt::Debug for MemoryChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryChain")
            .field("name", &self.name)
            .field("account", &self.account)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

fn derive_address(parts: &[&str]) -> String {
    let digest = Sha256::digest(parts.join(":").as_bytes());
    format!("0x{}", hex::encode(&digest[digest.len() - 20..]))
}

fn event_topic(event: &DecodedEvent) -> String {
    let signature = match event {
        DecodedEvent::Mint { .. } => "Mint(address,address,string)",
        DecodedEvent::AddedFile { .. } => "AddedFile(uint256)",
        DecodedEvent::EditedFile { .. } => "EditedFile(uint256)",
    };
    format!("0x{}", hex::encode(Sha256::digest(signature.as_bytes())))
}

fn arity(function: &str, expected: usize, got: usize) -> ChainError {
    ChainError::InvalidArguments {
        function: function.to_string(),
        reason: format!("expected {} arguments, got {}", expected, got),
    }
}

fn string_arg(function: &str, value: &AbiValue) -> Result<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| ChainError::InvalidArguments {
            function: function.to_string(),
            reason: format!("expected string, got {:?}", value),
        })
}

fn uint_arg(function: &str, value: &AbiValue) -> Result<u128> {
    value.as_uint().ok_or_else(|| ChainError::InvalidArguments {
        function: function.to_string(),
        reason: format!("expected uint, got {:?}", value),
    })
}

fn record_from_args(
    function: &str,
    metadata: &AbiValue,
    content: &AbiValue,
    gate: &AbiValue,
    file_type: &AbiValue,
    version: &AbiValue,
) -> Result<FileRecord> {
    let file_type = u8::try_from(uint_arg(function, file_type)?)
        .ok()
        .filter(|code| *code <= 3)
        .ok_or_else(|| ChainError::InvalidArguments {
            function: function.to_string(),
            reason: "file type out of range".to_string(),
        })?;
    let version = u64::try_from(uint_arg(function, version)?).map_err(|_| {
        ChainError::InvalidArguments {
            function: function.to_string(),
            reason: "version out of range".to_string(),
        }
    })?;

    Ok(FileRecord {
        metadata_ipfs_hash: string_arg(function, metadata)?,
        content_ipfs_hash: string_arg(function, content)?,
        gate_ipfs_hash: string_arg(function, gate)?,
        file_type,
        version,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACCOUNT: &str = "0x00000000000000000000000000000000000000aa";

    async fn minted(chain: &MemoryChain, namespace: &str) -> String {
        let tx = chain
            .submit_call(
                &chain.registry_address(),
                functions::MINT,
                vec![namespace.into(), "ipfs://portal".into(), "owner-key".into()],
            )
            .await
            .unwrap();
        let receipt = chain.wait_for_receipt(&tx).await.unwrap();
        receipt.minted_portal().unwrap().to_string()
    }

    fn add_file_args(metadata: &str, content: &str) -> Vec<AbiValue> {
        vec![
            metadata.into(),
            content.into(),
            "".into(),
            AbiValue::Uint(0),
            AbiValue::Uint(0),
        ]
    }

    #[tokio::test]
    async fn test_mint_and_add_file() {
        let chain = MemoryChain::new("gnosis", ACCOUNT);
        let portal = minted(&chain, "notes").await;

        let tx = chain
            .submit_call(&portal, functions::ADD_FILE, add_file_args("ipfs://m", "ipfs://c"))
            .await
            .unwrap();
        let receipt = chain.wait_for_receipt(&tx).await.unwrap();
        assert_eq!(receipt.added_file_id(), Some(0));
        assert_eq!(receipt.logs.len(), 1);

        let record = chain
            .read_state(&portal, functions::FILES, vec![AbiValue::Uint(0)])
            .await
            .unwrap();
        let record = FileRecord::from_abi(&record).unwrap();
        assert_eq!(record.content_ipfs_hash, "ipfs://c");
        assert_eq!(chain.portal_owner_key(&portal).as_deref(), Some("owner-key"));
    }

    #[tokio::test]
    async fn test_namespace_is_unique() {
        let chain = MemoryChain::new("gnosis", ACCOUNT);
        minted(&chain, "notes").await;

        let err = chain
            .submit_call(
                &chain.registry_address(),
                functions::MINT,
                vec!["notes".into(), "ipfs://p".into(), "k".into()],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::Contract(_)));
    }

    #[tokio::test]
    async fn test_edit_file() {
        let chain = MemoryChain::new("gnosis", ACCOUNT);
        let portal = minted(&chain, "notes").await;
        chain
            .submit_call(&portal, functions::ADD_FILE, add_file_args("ipfs://m", "ipfs://c"))
            .await
            .unwrap();

        let mut args = vec![AbiValue::Uint(0)];
        args.extend(add_file_args("ipfs://m2", "ipfs://c2"));
        let tx = chain
            .submit_call(&portal, functions::EDIT_FILE, args)
            .await
            .unwrap();

        assert_eq!(
            chain.wait_for_receipt(&tx).await.unwrap().edited_file_id(),
            Some(0)
        );
        assert_eq!(chain.file(&portal, 0).unwrap().metadata_ipfs_hash, "ipfs://m2");

        let mut missing = vec![AbiValue::Uint(5)];
        missing.extend(add_file_args("ipfs://m", "ipfs://c"));
        assert!(chain
            .submit_call(&portal, functions::EDIT_FILE, missing)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_unknown_file_reads_as_empty_record() {
        let chain = MemoryChain::new("gnosis", ACCOUNT);
        let portal = minted(&chain, "notes").await;

        let values = chain
            .read_state(&portal, functions::FILES, vec![AbiValue::Uint(42)])
            .await
            .unwrap();
        assert!(FileRecord::from_abi(&values).unwrap().is_empty());

        let count = chain
            .read_state(&portal, functions::GET_FILE_COUNT, Vec::new())
            .await
            .unwrap();
        assert_eq!(count, vec![AbiValue::Uint(0)]);
    }

    #[tokio::test]
    async fn test_events_can_be_suppressed() {
        let chain = MemoryChain::new("gnosis", ACCOUNT);
        let portal = minted(&chain, "notes").await;
        chain.set_emit_events(false);

        let tx = chain
            .submit_call(&portal, functions::ADD_FILE, add_file_args("ipfs://m", "ipfs://c"))
            .await
            .unwrap();
        let receipt = chain.wait_for_receipt(&tx).await.unwrap();

        assert!(receipt.events.is_empty());
        assert_eq!(receipt.added_file_id(), None);
        assert_eq!(chain.submitted_count(), 2);
    }
}
