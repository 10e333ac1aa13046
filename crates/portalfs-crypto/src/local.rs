//! In-process threshold network
//!
//! `LocalThresholdNetwork` keeps one AES-256-GCM key per (domain, ritual) and a
//! table of chain facts it evaluates conditions against. It stands in for the
//! real network in development and tests; nothing leaves the process.

use crate::{
    condition::{Condition, ContractCondition, LogicalOperator, RpcCondition, USER_ADDRESS_PARAM},
    context::ConditionContext,
    keys::{normalize_address, RitualKey, SigningIdentity},
    message_kit::{KitHeader, MessageKit},
    network::{Domain, DomainSession, NetworkError, RitualStatus, ThresholdNetwork},
    symmetric::{Aead, Nonce},
};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, instrument};

/// Decryption shares a local ritual pretends to require
pub const DEFAULT_THRESHOLD: u32 = 2;

struct LocalRitual {
    key: Arc<RitualKey>,
    status: RitualStatus,
}

/// Threshold network simulated in memory
pub struct LocalThresholdNetwork {
    rituals: DashMap<(Domain, u32), LocalRitual>,
    native_balances: DashMap<(u64, String), u128>,
    erc20_balances: DashMap<(u64, String, String), u128>,
    erc721_owners: DashMap<(u64, String, u64), String>,
    block_times: DashMap<u64, u64>,
    reachable: AtomicBool,
    pending_init_failures: AtomicU32,
    init_delay: Option<Duration>,
    initialize_calls: AtomicUsize,
    connect_calls: AtomicUsize,
}

impl LocalThresholdNetwork {
    pub fn new() -> Self {
        Self {
            rituals: DashMap::new(),
            native_balances: DashMap::new(),
            erc20_balances: DashMap::new(),
            erc721_owners: DashMap::new(),
            block_times: DashMap::new(),
            reachable: AtomicBool::new(true),
            pending_init_failures: AtomicU32::new(0),
            init_delay: None,
            initialize_calls: AtomicUsize::new(0),
            connect_calls: AtomicUsize::new(0),
        }
    }

    /// Register an active ritual with fresh key material
    pub fn with_ritual(self, domain: Domain, ritual_id: u32) -> Self {
        self.rituals.insert(
            (domain, ritual_id),
            LocalRitual {
                key: Arc::new(RitualKey::generate()),
                status: RitualStatus::Active,
            },
        );
        self
    }

    /// Make `initialize` take this long (to exercise concurrent first use)
    pub fn with_init_delay(mut self, delay: Duration) -> Self {
        self.init_delay = Some(delay);
        self
    }

    /// Change the status of a registered ritual
    pub fn set_ritual_status(&self, domain: Domain, ritual_id: u32, status: RitualStatus) {
        if let Some(mut ritual) = self.rituals.get_mut(&(domain, ritual_id)) {
            ritual.status = status;
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Make the next `count` calls to `initialize` fail
    pub fn fail_next_initializations(&self, count: u32) {
        self.pending_init_failures.store(count, Ordering::SeqCst);
    }

    pub fn set_native_balance(&self, chain: u64, address: &str, wei: u128) {
        self.native_balances.insert((chain, fact_key(address)), wei);
    }

    pub fn set_erc20_balance(&self, chain: u64, contract: &str, holder: &str, amount: u128) {
        self.erc20_balances
            .insert((chain, fact_key(contract), fact_key(holder)), amount);
    }

    pub fn set_erc721_owner(&self, chain: u64, contract: &str, token_id: u64, owner: &str) {
        self.erc721_owners
            .insert((chain, fact_key(contract), token_id), fact_key(owner));
    }

    /// Pin the block time of a chain (defaults to the wall clock)
    pub fn set_block_time(&self, chain: u64, timestamp: u64) {
        self.block_times.insert(chain, timestamp);
    }

    pub fn initialize_calls(&self) -> usize {
        self.initialize_calls.load(Ordering::SeqCst)
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    fn ritual_key(&self, domain: Domain, ritual_id: u32) -> Result<Arc<RitualKey>, NetworkError> {
        let ritual = self.rituals.get(&(domain, ritual_id)).ok_or_else(|| {
            NetworkError::Rejected(format!("ritual {} is not known on {}", ritual_id, domain))
        })?;
        if ritual.status != RitualStatus::Active {
            return Err(NetworkError::Rejected(format!(
                "ritual {} on {} is not active",
                ritual_id, domain
            )));
        }
        Ok(ritual.key.clone())
    }

    /// Resolve every context parameter the condition names
    fn resolve_parameters(
        &self,
        condition: &Condition,
        context: Option<&ConditionContext>,
    ) -> Result<BTreeMap<String, Value>, NetworkError> {
        let required = condition.context_parameters();
        if required.is_empty() {
            return Ok(BTreeMap::new());
        }

        let context = context.ok_or_else(|| {
            NetworkError::MissingContext(required.iter().cloned().collect())
        })?;
        let missing = context.missing(&required);
        if !missing.is_empty() {
            return Err(NetworkError::MissingContext(
                missing.into_iter().map(str::to_string).collect(),
            ));
        }

        let mut resolved = BTreeMap::new();
        for name in required {
            let value = if name == USER_ADDRESS_PARAM {
                let auth = context
                    .user_auth()
                    .ok_or_else(|| NetworkError::MissingContext(vec![name.clone()]))?
                    .map_err(|e| NetworkError::Malformed(e.to_string()))?;
                let address = auth
                    .verify()
                    .map_err(|e| NetworkError::Rejected(format!("invalid attestation: {}", e)))?;
                Value::String(address)
            } else {
                context.get(&name).cloned().unwrap_or(Value::Null)
            };
            resolved.insert(name, value);
        }
        Ok(resolved)
    }

    fn evaluate(
        &self,
        condition: &Condition,
        params: &BTreeMap<String, Value>,
    ) -> Result<bool, NetworkError> {
        match condition {
            Condition::Rpc(c) => self.evaluate_rpc(c, params),
            Condition::Contract(c) => self.evaluate_contract(c, params),
            Condition::Time(c) => {
                let chain = c.chain.unwrap_or_default();
                let now = self
                    .block_times
                    .get(&chain)
                    .map(|t| *t)
                    .unwrap_or_else(unix_now);
                let expected = amount(&resolve(&c.return_value_test.value, params))?;
                Ok(c.return_value_test.comparator.compare(&(now as u128), &expected))
            }
            Condition::Compound(c) => match c.operator {
                LogicalOperator::And => {
                    for operand in &c.operands {
                        if !self.evaluate(operand, params)? {
                            return Ok(false);
                        }
                    }
                    Ok(true)
                }
                LogicalOperator::Or => {
                    for operand in &c.operands {
                        if self.evaluate(operand, params)? {
                            return Ok(true);
                        }
                    }
                    Ok(false)
                }
                LogicalOperator::Not => match c.operands.first() {
                    Some(operand) => Ok(!self.evaluate(operand, params)?),
                    None => Err(NetworkError::Malformed("'not' without operand".to_string())),
                },
            },
        }
    }

    fn evaluate_rpc(
        &self,
        c: &RpcCondition,
        params: &BTreeMap<String, Value>,
    ) -> Result<bool, NetworkError> {
        if c.method != "eth_getBalance" {
            return Err(NetworkError::Rejected(format!(
                "unsupported rpc method: {}",
                c.method
            )));
        }
        let holder = address_param(c.parameters.first(), params)?;
        let balance = self
            .native_balances
            .get(&(c.chain.unwrap_or_default(), holder))
            .map(|b| *b)
            .unwrap_or(0);
        let expected = amount(&resolve(&c.return_value_test.value, params))?;
        Ok(c.return_value_test.comparator.compare(&balance, &expected))
    }

    fn evaluate_contract(
        &self,
        c: &ContractCondition,
        params: &BTreeMap<String, Value>,
    ) -> Result<bool, NetworkError> {
        let chain = c.chain.unwrap_or_default();
        let contract = fact_key(&c.contract_address);
        let standard = c.standard_contract_type.as_deref().unwrap_or_default();
        let test = &c.return_value_test;

        match (standard, c.method.as_str()) {
            ("ERC20", "balanceOf") => {
                let holder = address_param(c.parameters.first(), params)?;
                let balance = self
                    .erc20_balances
                    .get(&(chain, contract, holder))
                    .map(|b| *b)
                    .unwrap_or(0);
                Ok(test.comparator.compare(&balance, &amount(&resolve(&test.value, params))?))
            }
            ("ERC721", "ownerOf") => {
                let token_id = c
                    .parameters
                    .first()
                    .map(|v| amount(&resolve(v, params)))
                    .transpose()?
                    .ok_or_else(|| NetworkError::Malformed("ownerOf needs a token id".to_string()))?;
                let token_id = u64::try_from(token_id).map_err(|_| {
                    NetworkError::Malformed(format!("token id out of range: {}", token_id))
                })?;
                let owner = self
                    .erc721_owners
                    .get(&(chain, contract, token_id))
                    .map(|o| o.value().clone())
                    .unwrap_or_default();
                let expected = address_value(&resolve(&test.value, params))?;
                Ok(test.comparator.compare(&owner, &expected))
            }
            ("ERC721", "balanceOf") => {
                let holder = address_param(c.parameters.first(), params)?;
                let count = self
                    .erc721_owners
                    .iter()
                    .filter(|entry| {
                        let (fact_chain, fact_contract, _) = entry.key();
                        *fact_chain == chain && *fact_contract == contract && *entry.value() == holder
                    })
                    .count() as u128;
                Ok(test.comparator.compare(&count, &amount(&resolve(&test.value, params))?))
            }
            (standard, method) => Err(NetworkError::Rejected(format!(
                "unsupported contract call: {} {}",
                standard, method
            ))),
        }
    }
}

impl Default for LocalThresholdNetwork {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ThresholdNetwork for LocalThresholdNetwork {
    async fn initialize(&self) -> Result<(), NetworkError> {
        self.initialize_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.init_delay {
            tokio::time::sleep(delay).await;
        }
        let failed = self
            .pending_init_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(NetworkError::Unreachable(
                "backend modules failed to load".to_string(),
            ));
        }
        Ok(())
    }

    async fn connect(
        &self,
        domain: Domain,
        porter_uris: &[String],
    ) -> Result<DomainSession, NetworkError> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        if !self.reachable.load(Ordering::SeqCst) {
            return Err(NetworkError::Unreachable(format!("{} is offline", domain)));
        }
        let mut id = [0u8; 8];
        rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut id);
        Ok(DomainSession {
            domain,
            session_id: hex::encode(id),
            porter_uris: porter_uris.to_vec(),
        })
    }

    async fn is_reachable(&self, _domain: Domain) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    async fn ritual_status(
        &self,
        domain: Domain,
        ritual_id: u32,
    ) -> Result<RitualStatus, NetworkError> {
        Ok(self
            .rituals
            .get(&(domain, ritual_id))
            .map(|r| r.status)
            .unwrap_or(RitualStatus::Unknown))
    }

    #[instrument(skip(self, session, message, condition, signer), fields(domain = %session.domain))]
    async fn encrypt(
        &self,
        session: &DomainSession,
        message: &[u8],
        condition: &Condition,
        ritual_id: u32,
        signer: &SigningIdentity,
    ) -> Result<MessageKit, NetworkError> {
        condition
            .validate()
            .map_err(|e| NetworkError::Malformed(e.to_string()))?;
        let key = self.ritual_key(session.domain, ritual_id)?;

        let nonce = Nonce::generate();
        let header = KitHeader {
            ritual_id,
            domain: session.domain,
            condition: condition.clone(),
            nonce: nonce.to_base64(),
            encryptor: signer.address(),
        };
        let aad = header
            .to_bytes()
            .map_err(|e| NetworkError::Malformed(e.to_string()))?;
        let ciphertext = Aead::new(&key)
            .encrypt_with_aad(&nonce, message, &aad)
            .map_err(|e| NetworkError::Rejected(e.to_string()))?;

        MessageKit::new(header, ciphertext).map_err(|e| NetworkError::Malformed(e.to_string()))
    }

    #[instrument(skip(self, session, kit, context), fields(domain = %session.domain, ritual_id = kit.header().ritual_id))]
    async fn decrypt(
        &self,
        session: &DomainSession,
        kit: &MessageKit,
        context: Option<&ConditionContext>,
    ) -> Result<Vec<u8>, NetworkError> {
        let header = kit.header();
        if header.domain != session.domain {
            return Err(NetworkError::Rejected(format!(
                "kit for {} sent to {}",
                header.domain, session.domain
            )));
        }
        let key = self.ritual_key(header.domain, header.ritual_id)?;

        let params = self.resolve_parameters(&header.condition, context)?;
        if !self.evaluate(&header.condition, &params)? {
            debug!("Condition not satisfied, withholding decryption shares");
            return Err(NetworkError::ThresholdNotMet {
                received: 0,
                required: DEFAULT_THRESHOLD,
            });
        }

        let nonce =
            Nonce::from_base64(&header.nonce).map_err(|e| NetworkError::Malformed(e.to_string()))?;
        Aead::new(&key)
            .decrypt_with_aad(&nonce, kit.ciphertext(), kit.associated_data())
            .map_err(|e| NetworkError::Malformed(e.to_string()))
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Lowercased key for fact tables
fn fact_key(address: &str) -> String {
    normalize_address(address).unwrap_or_else(|_| address.trim().to_ascii_lowercase())
}

fn resolve(value: &Value, params: &BTreeMap<String, Value>) -> Value {
    match value.as_str().filter(|s| s.starts_with(':')) {
        Some(name) => params.get(name).cloned().unwrap_or(Value::Null),
        None => value.clone(),
    }
}

/// Unsigned amount; integral floats and oversized digit strings saturate at `u128::MAX`
fn amount(value: &Value) -> Result<u128, NetworkError> {
    let malformed = || NetworkError::Malformed(format!("not an unsigned amount: {}", value));
    match value {
        Value::Number(n) => match (n.as_u64(), n.as_f64()) {
            (Some(v), _) => Ok(u128::from(v)),
            (None, Some(f)) if f.is_finite() && f >= 0.0 && f.fract() == 0.0 => Ok(f as u128),
            _ => Err(malformed()),
        },
        Value::String(s) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => {
            Ok(s.parse::<u128>().unwrap_or(u128::MAX))
        }
        _ => Err(malformed()),
    }
}

fn address_value(value: &Value) -> Result<String, NetworkError> {
    value
        .as_str()
        .map(fact_key)
        .ok_or_else(|| NetworkError::Malformed(format!("not an address: {}", value)))
}

fn address_param(
    param: Option<&Value>,
    params: &BTreeMap<String, Value>,
) -> Result<String, NetworkError> {
    let param = param.ok_or_else(|| NetworkError::Malformed("missing address parameter".to_string()))?;
    address_value(&resolve(param, params))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::AuthProvider;

    const CHAIN: u64 = 80002;
    const NFT: &str = "0x1111111111111111111111111111111111111111";

    async fn session(network: &LocalThresholdNetwork) -> DomainSession {
        network.connect(Domain::Lynx, &[]).await.unwrap()
    }

    fn context_for(identity: &SigningIdentity) -> ConditionContext {
        ConditionContext::new().with_auth(AuthProvider::new(identity.clone()).attest("lynx"))
    }

    #[tokio::test]
    async fn test_balance_condition() {
        let network = LocalThresholdNetwork::new().with_ritual(Domain::Lynx, 27);
        let signer = SigningIdentity::generate();
        let reader = SigningIdentity::generate();
        network.set_native_balance(CHAIN, &reader.address(), 5);
        let session = session(&network).await;

        let condition = Condition::native_balance_at_least(5).on_chain(CHAIN);
        let kit = network
            .encrypt(&session, b"payload", &condition, 27, &signer)
            .await
            .unwrap();

        let plaintext = network
            .decrypt(&session, &kit, Some(&context_for(&reader)))
            .await
            .unwrap();
        assert_eq!(plaintext, b"payload");

        let poor = SigningIdentity::generate();
        let denied = network
            .decrypt(&session, &kit, Some(&context_for(&poor)))
            .await;
        assert!(matches!(denied, Err(NetworkError::ThresholdNotMet { .. })));
    }

    #[tokio::test]
    async fn test_nft_owner_condition() {
        let network = LocalThresholdNetwork::new().with_ritual(Domain::Lynx, 27);
        let owner = SigningIdentity::generate();
        network.set_erc721_owner(CHAIN, NFT, 42, &owner.address());
        let session = session(&network).await;

        let condition = Condition::erc721_owner(NFT, 42).on_chain(CHAIN);
        let kit = network
            .encrypt(&session, b"nft", &condition, 27, &owner)
            .await
            .unwrap();

        assert!(network
            .decrypt(&session, &kit, Some(&context_for(&owner)))
            .await
            .is_ok());
        assert!(network
            .decrypt(&session, &kit, Some(&context_for(&SigningIdentity::generate())))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_oversized_token_id_rejected() {
        let network = LocalThresholdNetwork::new().with_ritual(Domain::Lynx, 27);
        let owner = SigningIdentity::generate();
        network.set_erc721_owner(CHAIN, NFT, 1, &owner.address());
        let session = session(&network).await;

        let mut condition = Condition::erc721_owner(NFT, 1).on_chain(CHAIN);
        if let Condition::Contract(c) = &mut condition {
            // u64::MAX + 2, which would truncate to token 1
            c.parameters = vec![Value::from("18446744073709551617")];
        }
        let kit = network
            .encrypt(&session, b"nft", &condition, 27, &owner)
            .await
            .unwrap();

        assert!(matches!(
            network.decrypt(&session, &kit, Some(&context_for(&owner))).await,
            Err(NetworkError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_threshold_denies() {
        let network = LocalThresholdNetwork::new().with_ritual(Domain::Lynx, 27);
        let reader = SigningIdentity::generate();
        network.set_native_balance(CHAIN, &reader.address(), u128::from(u64::MAX));
        let session = session(&network).await;

        let condition = Condition::native_balance_at_least(100_000_000_000_000_000_000).on_chain(CHAIN);
        let kit = network
            .encrypt(&session, b"vault", &condition, 27, &reader)
            .await
            .unwrap();

        assert!(matches!(
            network.decrypt(&session, &kit, Some(&context_for(&reader))).await,
            Err(NetworkError::ThresholdNotMet { .. })
        ));
    }

    #[test]
    fn test_amount_forms() {
        assert_eq!(amount(&Value::from(7u64)).unwrap(), 7);
        assert_eq!(amount(&serde_json::json!(1e20)).unwrap(), 100_000_000_000_000_000_000);
        assert_eq!(amount(&Value::from("340282366920938463463374607431768211456")).unwrap(), u128::MAX);
        assert!(amount(&serde_json::json!(1.5)).is_err());
        assert!(amount(&serde_json::json!(-1)).is_err());
        assert!(amount(&Value::from("0x10")).is_err());
    }

    #[tokio::test]
    async fn test_compound_and_time() {
        let network = LocalThresholdNetwork::new().with_ritual(Domain::Lynx, 27);
        network.set_block_time(CHAIN, 1_000);
        let session = session(&network).await;
        let signer = SigningIdentity::generate();

        let open = Condition::or(vec![
            Condition::block_time_at_least(500),
            Condition::native_balance_at_least(1),
        ])
        .on_chain(CHAIN);
        let kit = network
            .encrypt(&session, b"time", &open, 27, &signer)
            .await
            .unwrap();
        assert!(network
            .decrypt(&session, &kit, Some(&context_for(&signer)))
            .await
            .is_ok());

        let locked = Condition::not(Condition::block_time_at_least(500)).on_chain(CHAIN);
        let kit = network
            .encrypt(&session, b"time", &locked, 27, &signer)
            .await
            .unwrap();
        assert!(matches!(
            network.decrypt(&session, &kit, None).await,
            Err(NetworkError::ThresholdNotMet { .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_context_reported() {
        let network = LocalThresholdNetwork::new().with_ritual(Domain::Lynx, 27);
        let session = session(&network).await;
        let signer = SigningIdentity::generate();

        let condition = Condition::native_balance_at_least(0).on_chain(CHAIN);
        let kit = network
            .encrypt(&session, b"x", &condition, 27, &signer)
            .await
            .unwrap();

        let err = network.decrypt(&session, &kit, None).await.unwrap_err();
        assert_eq!(
            err,
            NetworkError::MissingContext(vec![USER_ADDRESS_PARAM.to_string()])
        );
    }

    #[tokio::test]
    async fn test_unknown_ritual_rejected() {
        let network = LocalThresholdNetwork::new();
        let session = session(&network).await;

        let result = network
            .encrypt(
                &session,
                b"x",
                &Condition::block_time_at_least(0),
                99,
                &SigningIdentity::generate(),
            )
            .await;
        assert!(matches!(result, Err(NetworkError::Rejected(_))));
    }

    #[tokio::test]
    async fn test_offline_network() {
        let network = LocalThresholdNetwork::new();
        network.set_reachable(false);

        assert!(!network.is_reachable(Domain::Tapir).await);
        assert!(matches!(
            network.connect(Domain::Tapir, &[]).await,
            Err(NetworkError::Unreachable(_))
        ));
        assert_eq!(network.connect_calls(), 1);
    }
}
