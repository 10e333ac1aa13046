//! Threshold-network access provider
//!
//! Wraps a `ThresholdNetwork` backend behind the `AccessProvider` trait:
//! - validates configuration synchronously at construction
//! - initializes shared modules once per process and the domain handshake once per adapter
//! - defaults condition chains from the configured domain
//! - maps "threshold not met" into `AccessError::AccessDenied`

use crate::{
    condition::{AccessCondition, Condition, USER_ADDRESS_PARAM},
    context::{AuthProvider, ConditionContext},
    keys::SigningIdentity,
    message_kit::MessageKit,
    network::{Domain, DomainSession, NetworkError, RitualStatus, ThresholdNetwork},
    provider::AccessProvider,
    runtime::{BackendRuntime, InitState},
    AccessError, Result,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

/// Identifier reported by `provider_type`
pub const THRESHOLD_PROVIDER_TYPE: &str = "threshold";

/// Configuration for `ThresholdAccessProvider`
#[derive(Clone, Debug)]
pub struct ThresholdConfig {
    /// Ritual whose key material encrypts content (must be > 0)
    pub ritual_id: u32,
    /// Network domain: `lynx`, `tapir` or `mainnet`
    pub domain: String,
    /// Chain RPC endpoint used for condition evaluation
    pub rpc_url: String,
    /// Identity that signs encryption requests and decryption attestations
    pub signer: Option<SigningIdentity>,
    /// Custom network endpoints (empty means the domain defaults)
    pub porter_uris: Vec<String>,
}

impl ThresholdConfig {
    pub fn new(ritual_id: u32, domain: impl Into<String>, rpc_url: impl Into<String>) -> Self {
        Self {
            ritual_id,
            domain: domain.into(),
            rpc_url: rpc_url.into(),
            signer: None,
            porter_uris: Vec::new(),
        }
    }

    pub fn with_signer(mut self, signer: SigningIdentity) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn with_porter_uris(mut self, uris: Vec<String>) -> Self {
        self.porter_uris = uris;
        self
    }

    /// Check every field and return the parsed domain and signer
    pub fn validate(&self) -> Result<(Domain, SigningIdentity)> {
        if self.ritual_id == 0 {
            return Err(AccessError::Configuration(
                "ritual_id must be a positive integer".to_string(),
            ));
        }
        if self.domain.trim().is_empty() {
            return Err(AccessError::Configuration("domain is required".to_string()));
        }
        let domain: Domain = self.domain.parse()?;

        if self.rpc_url.trim().is_empty() {
            return Err(AccessError::Configuration(
                "rpc_url (chain client) is required".to_string(),
            ));
        }
        check_url("rpc_url", &self.rpc_url, &["http", "https", "ws", "wss"])?;

        for uri in &self.porter_uris {
            check_url("porter_uris", uri, &["http", "https"])?;
        }

        let signer = self.signer.clone().ok_or_else(|| {
            AccessError::Configuration("signer (signing identity) is required".to_string())
        })?;

        Ok((domain, signer))
    }
}

fn check_url(field: &str, value: &str, schemes: &[&str]) -> Result<()> {
    let parsed = url::Url::parse(value)
        .map_err(|e| AccessError::Configuration(format!("{} '{}' is not a URL: {}", field, value, e)))?;
    if !schemes.contains(&parsed.scheme()) {
        return Err(AccessError::Configuration(format!(
            "{} '{}' must use one of: {}",
            field,
            value,
            schemes.join(", ")
        )));
    }
    Ok(())
}

/// `AccessProvider` backed by a threshold-encryption network
pub struct ThresholdAccessProvider {
    config: ThresholdConfig,
    domain: Domain,
    signer: SigningIdentity,
    network: Arc<dyn ThresholdNetwork>,
    runtime: BackendRuntime,
    session: OnceCell<DomainSession>,
    state: Mutex<InitState>,
}

impl ThresholdAccessProvider {
    /// Create a provider on the process-wide backend runtime
    pub fn new(config: ThresholdConfig, network: Arc<dyn ThresholdNetwork>) -> Result<Self> {
        let (domain, signer) = config.validate()?;
        Ok(Self {
            config,
            domain,
            signer,
            network,
            runtime: BackendRuntime::global(),
            session: OnceCell::new(),
            state: Mutex::new(InitState::Uninitialized),
        })
    }

    /// Use a specific backend runtime instead of the process-wide one
    pub fn with_runtime(mut self, runtime: BackendRuntime) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn init_state(&self) -> InitState {
        *self.state.lock()
    }

    pub fn domain(&self) -> Domain {
        self.domain
    }

    pub fn ritual_id(&self) -> u32 {
        self.config.ritual_id
    }

    /// Address of the configured signer
    pub fn signer_address(&self) -> String {
        self.signer.address()
    }

    /// Run module initialization and the domain handshake, at most once each
    async fn ensure_ready(&self) -> std::result::Result<&DomainSession, NetworkError> {
        if let Some(session) = self.session.get() {
            return Ok(session);
        }

        {
            let mut state = self.state.lock();
            if *state != InitState::Ready {
                *state = InitState::Initializing;
            }
        }

        let result = self
            .session
            .get_or_try_init(|| async {
                self.runtime
                    .ensure_initialized(self.network.as_ref())
                    .await?;
                let session = self
                    .network
                    .connect(self.domain, &self.config.porter_uris)
                    .await?;
                info!(domain = %self.domain, session_id = %session.session_id, "Connected to threshold network");
                Ok::<_, NetworkError>(session)
            })
            .await;

        let mut state = self.state.lock();
        match &result {
            Ok(_) => *state = InitState::Ready,
            Err(e) => {
                warn!(domain = %self.domain, error = %e, "Threshold network initialization failed");
                if *state != InitState::Ready {
                    *state = InitState::Failed;
                }
            }
        }
        result
    }

    /// Build the context the kit's condition asks for from the configured signer
    fn derive_context(&self, condition: &Condition) -> ConditionContext {
        let mut context = ConditionContext::new();
        for param in condition.context_parameters() {
            if param == USER_ADDRESS_PARAM {
                let auth = AuthProvider::new(self.signer.clone()).attest(self.domain.as_str());
                context = context.with_auth(auth);
            } else {
                debug!(param = %param, "Context parameter cannot be derived");
            }
        }
        context
    }

    fn encryption_error(&self, reason: impl ToString) -> AccessError {
        AccessError::Encryption {
            domain: self.domain.to_string(),
            ritual_id: self.config.ritual_id,
            reason: reason.to_string(),
        }
    }

    fn decryption_error(&self, reason: impl ToString) -> AccessError {
        AccessError::Decryption {
            domain: self.domain.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl AccessProvider for ThresholdAccessProvider {
    fn provider_type(&self) -> &str {
        THRESHOLD_PROVIDER_TYPE
    }

    fn supports_encryption(&self) -> bool {
        true
    }

    #[instrument(skip(self), fields(domain = %self.domain, ritual_id = self.config.ritual_id))]
    async fn validate_config(&self) -> Result<bool> {
        self.ensure_ready().await.map_err(|e| {
            AccessError::Configuration(format!(
                "threshold network for domain {} is not available: {}",
                self.domain, e
            ))
        })?;

        if !self.network.is_reachable(self.domain).await {
            return Err(AccessError::Configuration(format!(
                "threshold network for domain {} is unreachable",
                self.domain
            )));
        }

        let status = self
            .network
            .ritual_status(self.domain, self.config.ritual_id)
            .await
            .map_err(|e| {
                AccessError::Configuration(format!(
                    "could not look up ritual {} on {}: {}",
                    self.config.ritual_id, self.domain, e
                ))
            })?;

        match status {
            RitualStatus::Active => Ok(true),
            RitualStatus::Expired => Err(AccessError::Configuration(format!(
                "ritual {} on domain {} has expired",
                self.config.ritual_id, self.domain
            ))),
            RitualStatus::Unknown => Err(AccessError::Configuration(format!(
                "ritual {} does not exist on domain {}",
                self.config.ritual_id, self.domain
            ))),
        }
    }

    #[instrument(skip(self, content, condition), fields(domain = %self.domain, ritual_id = self.config.ritual_id, size = content.len()))]
    async fn encrypt(&self, content: &[u8], condition: &AccessCondition) -> Result<Vec<u8>> {
        let mut parsed =
            Condition::from_access_condition(condition).map_err(|e| self.encryption_error(e))?;
        parsed.default_chain(self.domain.default_chain_id());

        let session = self
            .ensure_ready()
            .await
            .map_err(|e| self.encryption_error(e))?;

        let kit = self
            .network
            .encrypt(session, content, &parsed, self.config.ritual_id, &self.signer)
            .await
            .map_err(|e| self.encryption_error(e))?;

        let bytes = kit.to_bytes();
        debug!(ciphertext_size = bytes.len(), "Content encrypted");
        Ok(bytes)
    }

    #[instrument(skip(self, ciphertext, context), fields(domain = %self.domain, size = ciphertext.len()))]
    async fn decrypt(
        &self,
        ciphertext: &[u8],
        context: Option<&ConditionContext>,
    ) -> Result<Vec<u8>> {
        let kit = MessageKit::from_bytes(ciphertext).map_err(|e| self.decryption_error(e))?;
        if kit.header().domain != self.domain {
            return Err(self.decryption_error(format!(
                "message kit belongs to domain {}",
                kit.header().domain
            )));
        }

        let derived;
        let context = match context {
            Some(context) => context,
            None => {
                derived = self.derive_context(&kit.header().condition);
                &derived
            }
        };

        let session = self
            .ensure_ready()
            .await
            .map_err(|e| self.decryption_error(e))?;

        self.network
            .decrypt(session, &kit, Some(context))
            .await
            .map_err(|e| match e {
                NetworkError::ThresholdNotMet { received, required } => AccessError::AccessDenied {
                    domain: self.domain.to_string(),
                    reason: format!(
                        "access condition not satisfied ({} of {} decryption shares)",
                        received, required
                    ),
                },
                other => self.decryption_error(other),
            })
    }

    fn config(&self) -> Value {
        json!({
            "providerType": THRESHOLD_PROVIDER_TYPE,
            "ritualId": self.config.ritual_id,
            "domain": self.domain.as_str(),
            "rpcUrl": self.config.rpc_url,
            "porterUris": self.config.porter_uris,
            "signerAddress": self.signer.address(),
        })
    }

    fn metadata_config(&self) -> Value {
        json!({
            "provider": THRESHOLD_PROVIDER_TYPE,
            "domain": self.domain.as_str(),
            "ritualId": self.config.ritual_id,
        })
    }
}

impl std::fmt::Debug for ThresholdAccessProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThresholdAccessProvider")
            .field("domain", &self.domain)
            .field("ritual_id", &self.config.ritual_id)
            .field("state", &self.init_state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ThresholdConfig {
        ThresholdConfig::new(27, "lynx", "https://rpc-amoy.polygon.technology")
            .with_signer(SigningIdentity::generate())
    }

    #[test]
    fn test_config_accepts_valid_fields() {
        let (domain, _) = config().validate().unwrap();
        assert_eq!(domain, Domain::Lynx);
    }

    #[test]
    fn test_config_rejects_zero_ritual() {
        let mut config = config();
        config.ritual_id = 0;
        assert!(matches!(config.validate(), Err(AccessError::Configuration(_))));
    }

    #[test]
    fn test_config_rejects_unknown_domain() {
        let mut config = config();
        config.domain = "devnet".to_string();
        assert!(matches!(config.validate(), Err(AccessError::Configuration(_))));
    }

    #[test]
    fn test_config_rejects_missing_signer() {
        let config = ThresholdConfig::new(27, "tapir", "https://rpc-amoy.polygon.technology");
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("signer"));
    }

    #[test]
    fn test_config_rejects_bad_urls() {
        let bad_rpc = ThresholdConfig::new(27, "lynx", "not a url")
            .with_signer(SigningIdentity::generate());
        assert!(bad_rpc.validate().is_err());

        let ftp_rpc = ThresholdConfig::new(27, "lynx", "ftp://rpc.example.com")
            .with_signer(SigningIdentity::generate());
        assert!(ftp_rpc.validate().is_err());

        let bad_porter = config().with_porter_uris(vec!["porter".to_string()]);
        assert!(bad_porter.validate().is_err());
    }
}
