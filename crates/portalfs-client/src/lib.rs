//! # Portalfs Client
//!
//! Agent SDK for portalfs: files whose content and metadata live in
//! content-addressed storage and whose records are anchored in an on-chain
//! portal contract. Content can be encrypted under an access condition
//! through a pluggable `AccessProvider`.
//!
//! ## Features
//!
//! - **Portal provisioning**: `setup` mints a portal per namespace and persists its credentials
//! - **File lifecycle**: create, read, update and soft-delete files
//! - **Gated content**: encrypt-or-passthrough decided by the presence of an access condition
//! - **Best-effort cleanup**: replaced blobs are unpinned, failures only logged
//!
//! ## Example
//!
//! ```rust,ignore
//! use portalfs_client::{Agent, AgentConfig, FileOptions};
//! use portalfs_chain::MemoryChain;
//! use portalfs_storage::MemoryStorage;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let chain = Arc::new(MemoryChain::new("gnosis", "0xabc..."));
//!     let agent = Agent::new(AgentConfig::new("notes"), chain, Arc::new(MemoryStorage::new()))?;
//!     agent.setup_default().await?;
//!
//!     let created = agent.create("Hello World", FileOptions::new()).await?;
//!     let file = agent.get_file_content(created.file_id, None).await?;
//!     println!("{:?}", file.content);
//!
//!     Ok(())
//! }
//! ```

mod agent;
mod config;
mod credentials;
mod error;
mod types;
pub mod validation;

pub use agent::{Agent, DELETED_SENTINEL};
pub use config::{AgentConfig, DEFAULT_CREDENTIALS_DIR, DEFAULT_DOWNLOAD_TIMEOUT};
pub use credentials::{
    credential_key, CredentialStore, FileCredentialStore, MemoryCredentialStore,
    PortalCredentials, PortalKeys,
};
pub use error::{AgentError, ErrorKind, Result};
pub use types::*;

// Re-export the collaborator traits callers implement or inject
pub use portalfs_chain::{ChainClient, FileType};
pub use portalfs_crypto::{AccessCondition, AccessProvider, ConditionContext};
pub use portalfs_storage::StorageProvider;
