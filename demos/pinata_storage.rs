//! Public files on IPFS through Pinata
//!
//! Requires `PINATA_JWT` and `PINATA_GATEWAY` (a `.env` file works). Portal
//! credentials land in `PORTALFS_CREDENTIALS_DIR` (default `.portalfs/credentials`).
//!
//! Run with: cargo run --example pinata_storage

use portalfs_chain::MemoryChain;
use portalfs_client::{Agent, AgentConfig, FileOptions};
use portalfs_storage::PinataStorage;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let storage = Arc::new(PinataStorage::from_env()?);
    let config = AgentConfig::from_env();
    let chain = Arc::new(MemoryChain::new(
        config.chain.clone().unwrap_or_else(|| "amoy".to_string()),
        "0x4444444444444444444444444444444444444444",
    ));
    let agent = Agent::new(config, chain, storage)?;

    let portal = agent.setup("pinata-demo").await?;
    println!("📦 Portal {}", portal.portal_address);

    let created = agent
        .create(
            serde_json::json!({ "message": "Hello from portalfs" }),
            FileOptions::new().with_name("hello"),
        )
        .await?;
    let file = agent.get_file(created.file_id).await?;
    println!("📤 Content pinned at {}", file.content_ref);
    println!("📝 Metadata pinned at {}", file.metadata_ref);

    Ok(())
}
