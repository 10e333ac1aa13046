//! Basic usage of the portalfs agent, fully in memory
//!
//! This demo shows:
//! - Provisioning a portal
//! - Creating a public and a gated file
//! - Reading, updating and deleting files
//!
//! Run with: cargo run --example basic_usage

use portalfs_chain::MemoryChain;
use portalfs_client::{Agent, AgentConfig, FileOptions, MemoryCredentialStore};
use portalfs_crypto::{
    Condition, Domain, LocalThresholdNetwork, SigningIdentity, ThresholdAccessProvider,
    ThresholdConfig,
};
use portalfs_storage::MemoryStorage;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    println!("🚀 portalfs - Basic Usage Demo\n");

    let chain = Arc::new(MemoryChain::new(
        "amoy",
        "0x3333333333333333333333333333333333333333",
    ));
    let storage = Arc::new(MemoryStorage::new());
    let network = Arc::new(LocalThresholdNetwork::new().with_ritual(Domain::Lynx, 6));

    let provider = ThresholdAccessProvider::new(
        ThresholdConfig::new(6, "lynx", "https://rpc-amoy.polygon.technology")
            .with_signer(SigningIdentity::generate()),
        network,
    )?;

    let agent = Agent::new(AgentConfig::new("demo"), chain, storage)?
        .with_credential_store(Arc::new(MemoryCredentialStore::new()))
        .with_access_provider(Arc::new(provider));

    // ==================== Portal ====================

    println!("📦 Provisioning portal 'demo'...");
    let portal = agent.setup_default().await?;
    println!("   ✅ Portal at {}", portal.portal_address);

    // ==================== Files ====================

    println!("\n📤 Creating a public file...");
    let public = agent
        .create("Hello World", FileOptions::new().with_name("hello"))
        .await?;
    println!("   ✅ File {} (tx {})", public.file_id, public.transaction_hash);

    println!("\n🔐 Creating a gated file...");
    let gated = agent
        .create(
            "Secret",
            FileOptions::new()
                .with_name("secret")
                .with_access_condition(Condition::native_balance_at_least(0)),
        )
        .await?;
    println!("   ✅ File {} encrypted: {}", gated.file_id, gated.encrypted);

    println!("\n📥 Reading both files...");
    for file_id in [public.file_id, gated.file_id] {
        let file = agent.get_file_content(file_id, None).await?;
        println!(
            "   - {}: {:?} (decrypted: {})",
            file.file.metadata.name, file.content, file.decrypted
        );
    }

    println!("\n✏️  Updating the public file...");
    agent
        .update(public.file_id, "Hello again", FileOptions::new().with_name("hello"))
        .await?;
    let file = agent.get_file_content(public.file_id, None).await?;
    println!("   ✅ Now: {:?}", file.content);

    println!("\n🗑️  Deleting the gated file...");
    agent.delete(gated.file_id).await?;
    let file = agent.get_file(gated.file_id).await?;
    println!("   ✅ Content ref is now {}", file.content_ref);

    println!("\n📊 Portal holds {} file records", agent.file_count().await?);
    Ok(())
}
