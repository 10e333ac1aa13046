//! End-to-end lifecycle tests across the portalfs crates
//!
//! These tests drive an `Agent` over the in-memory chain and storage with a
//! threshold access provider on the in-process network.

use portalfs_chain::{ChainClient, MemoryChain};
use portalfs_client::{
    Agent, AgentConfig, Content, ErrorKind, FileCredentialStore, FileOptions, MemoryCredentialStore,
};
use portalfs_crypto::{
    AccessCondition, AccessProvider, AuthProvider, BackendRuntime, Condition, ConditionContext,
    Domain, LocalThresholdNetwork, SigningIdentity, ThresholdAccessProvider, ThresholdConfig,
};
use portalfs_storage::MemoryStorage;
use serde_json::{json, Value};
use std::sync::Arc;

const ACCOUNT: &str = "0x2222222222222222222222222222222222222222";
const RITUAL: u32 = 6;
const RPC_URL: &str = "https://rpc-amoy.polygon.technology";

struct World {
    chain: MemoryChain,
    storage: MemoryStorage,
    network: Arc<LocalThresholdNetwork>,
}

impl World {
    fn new() -> Self {
        Self {
            chain: MemoryChain::new("amoy", ACCOUNT),
            storage: MemoryStorage::new(),
            network: Arc::new(LocalThresholdNetwork::new().with_ritual(Domain::Lynx, RITUAL)),
        }
    }

    fn provider(&self, signer: SigningIdentity) -> Arc<dyn AccessProvider> {
        let config = ThresholdConfig::new(RITUAL, "lynx", RPC_URL).with_signer(signer);
        Arc::new(
            ThresholdAccessProvider::new(config, self.network.clone())
                .unwrap()
                .with_runtime(BackendRuntime::new()),
        )
    }

    fn agent(&self) -> Agent {
        Agent::new(
            AgentConfig::new("journal"),
            Arc::new(self.chain.clone()),
            Arc::new(self.storage.clone()),
        )
        .unwrap()
        .with_credential_store(Arc::new(MemoryCredentialStore::new()))
    }

    fn gated_agent(&self) -> Agent {
        self.agent()
            .with_access_provider(self.provider(SigningIdentity::generate()))
    }
}

#[test_log::test(tokio::test)]
async fn test_public_file_scenario() {
    let world = World::new();
    let agent = world.agent();
    agent.setup_default().await.unwrap();

    let created = agent.create("Hello World", FileOptions::new()).await.unwrap();
    assert!(!created.encrypted);
    assert!(!created.transaction_hash.is_empty());

    let file = agent.get_file_content(created.file_id, None).await.unwrap();
    assert_eq!(file.content, Content::Text("Hello World".to_string()));
    assert!(!file.decrypted);
}

#[test_log::test(tokio::test)]
async fn test_gated_file_scenario() {
    let world = World::new();
    let agent = world.gated_agent();
    agent.setup_default().await.unwrap();

    let reader = SigningIdentity::generate();
    world
        .network
        .set_native_balance(80002, &reader.address(), 1);

    let condition: AccessCondition = Condition::native_balance_at_least(0).into();
    let created = agent
        .create(
            "Secret",
            FileOptions::new().with_access_condition(condition.clone()),
        )
        .await
        .unwrap();
    assert!(created.encrypted);
    assert_eq!(created.access_condition, Some(condition));

    let context = ConditionContext::new().with_auth(AuthProvider::new(reader).attest("lynx"));
    let file = agent
        .get_file_content(created.file_id, Some(&context))
        .await
        .unwrap();
    assert_eq!(file.content.as_text(), Some("Secret"));
    assert!(file.decrypted);
}

#[tokio::test]
async fn test_null_condition_scenario() {
    let world = World::new();
    let agent = world.gated_agent();
    agent.setup_default().await.unwrap();
    let uploads = world.storage.upload_count();
    let submitted = world.chain.submitted_count();

    let err = agent
        .create(
            "x",
            FileOptions::new().with_access_condition(AccessCondition::from_value(Value::Null)),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(world.storage.upload_count(), uploads);
    assert_eq!(world.chain.submitted_count(), submitted);
    assert_eq!(agent.file_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_delete_scenario() {
    let world = World::new();
    let agent = world.agent();
    let portal = agent.setup_default().await.unwrap();

    let created = agent.create("to be removed", FileOptions::new()).await.unwrap();
    agent.delete(created.file_id).await.unwrap();

    let record = world.chain.file(&portal.portal_address, created.file_id).unwrap();
    assert_eq!(record.content_ipfs_hash, "ipfs://deleted");
    assert_eq!(record.metadata_ipfs_hash, "ipfs://deleted");

    let file = agent.get_file(created.file_id).await.unwrap();
    assert!(file.deleted);
    assert_eq!(file.metadata_ref, "ipfs://deleted");
    assert_eq!(agent.file_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_missing_provider_performs_no_io() {
    let world = World::new();
    let agent = world.agent();
    agent.setup_default().await.unwrap();
    let uploads = world.storage.upload_count();
    let submitted = world.chain.submitted_count();

    let err = agent
        .create(
            "Secret",
            FileOptions::new().with_access_condition(AccessCondition::from_value(
                json!({ "conditionType": "time" }),
            )),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ProviderRequired);
    assert_eq!(world.storage.upload_count(), uploads);
    assert_eq!(world.chain.submitted_count(), submitted);
}

#[tokio::test]
async fn test_encrypted_flag_tracks_condition() {
    let world = World::new();
    let agent = world.gated_agent();
    agent.setup_default().await.unwrap();

    let public = agent.create("open", FileOptions::new()).await.unwrap();
    let gated = agent
        .create(
            "closed",
            FileOptions::new().with_access_condition(Condition::block_time_at_least(0)),
        )
        .await
        .unwrap();

    assert!(!agent.get_file(public.file_id).await.unwrap().encrypted);
    assert!(agent.get_file(gated.file_id).await.unwrap().encrypted);
}

#[tokio::test]
async fn test_unpin_failures_are_swallowed() {
    let world = World::new();
    let agent = world.agent();
    agent.setup_default().await.unwrap();
    let created = agent.create("v1", FileOptions::new()).await.unwrap();

    world.storage.set_fail_unpin(true);
    let updated = agent
        .update(created.file_id, "v2", FileOptions::new())
        .await
        .unwrap();

    assert_eq!(updated.file_id, created.file_id);
    assert!(!updated.transaction_hash.is_empty());
}

#[tokio::test]
async fn test_setup_reuses_persisted_portal() {
    let dir = tempfile::tempdir().unwrap();
    let world = World::new();
    let new_agent = || {
        Agent::new(
            AgentConfig::new("journal").with_credentials_dir(dir.path()),
            Arc::new(world.chain.clone()),
            Arc::new(world.storage.clone()),
        )
        .unwrap()
    };

    let first = new_agent().setup_default().await.unwrap();
    assert!(dir.path().join("journal-amoy.json").exists());
    let mints = world.chain.submitted_count();

    let second = new_agent().setup_default().await.unwrap();
    assert_eq!(second, first);
    assert_eq!(world.chain.submitted_count(), mints);
    assert_eq!(world.chain.portal_count(), 1);
    assert_eq!(
        world.chain.portal_owner_key(&first.portal_address),
        Some(first.keys.owner_public_key.clone())
    );

    let store = FileCredentialStore::new(dir.path());
    assert_eq!(store.dir(), dir.path());
}

#[tokio::test]
async fn test_chain_mismatch_rejected() {
    let world = World::new();
    let err = Agent::new(
        AgentConfig::new("journal").with_chain("mainnet"),
        Arc::new(world.chain.clone()),
        Arc::new(world.storage.clone()),
    )
    .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert_eq!(world.chain.chain_name(), "amoy");
}

#[tokio::test]
async fn test_namespace_minted_once_per_chain() {
    let world = World::new();
    let writer = world.gated_agent();
    writer.setup_default().await.unwrap();

    let created = writer
        .create(
            json!({ "entry": 1 }),
            FileOptions::new().with_access_condition(Condition::native_balance_at_least(0)),
        )
        .await
        .unwrap();
    let file = writer.get_file_content(created.file_id, None).await.unwrap();
    assert_eq!(file.content, Content::Json(json!({ "entry": 1 })));

    // Without the persisted credentials a second agent cannot claim the namespace
    let other = world.gated_agent();
    assert_eq!(other.prechecks().unwrap_err().kind(), ErrorKind::NotSetup);

    let err = other.setup_default().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Chain);
    assert_eq!(world.chain.portal_count(), 1);
}
