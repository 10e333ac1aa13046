//! # Portalfs Chain
//!
//! On-chain side of portalfs: the portal registry mints one portal contract per
//! namespace, and each portal keeps the file records of its owner.
//!
//! This crate provides:
//! - **ChainClient**: submit calls, await receipts with decoded events, read contract state
//! - **Types**: ABI values, receipts, `Mint`/`AddedFile`/`EditedFile` events, file records
//! - **MemoryChain**: an in-process registry and portals for development and tests

pub mod error;
pub mod memory;
pub mod types;

pub use error::{ChainError, Result};
pub use memory::{MemoryChain, SubmittedCall};
pub use types::{
    functions, AbiValue, DecodedEvent, FileRecord, FileType, LogEntry, TxHash, TxReceipt,
};

use async_trait::async_trait;

/// Client for the chain hosting the portal registry
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Chain name used to key persisted credentials (e.g. `gnosis`, `sepolia`)
    fn chain_name(&self) -> &str;

    /// Address transactions are sent from
    fn account(&self) -> String;

    /// Address of the portal registry contract
    fn registry_address(&self) -> String;

    /// Submit a state-changing call and return its transaction hash
    async fn submit_call(
        &self,
        target: &str,
        function: &str,
        args: Vec<AbiValue>,
    ) -> Result<TxHash>;

    /// Wait until the transaction is confirmed (no timeout)
    async fn wait_for_receipt(&self, tx_hash: &TxHash) -> Result<TxReceipt>;

    /// Call a view function
    async fn read_state(
        &self,
        target: &str,
        function: &str,
        args: Vec<AbiValue>,
    ) -> Result<Vec<AbiValue>>;
}
