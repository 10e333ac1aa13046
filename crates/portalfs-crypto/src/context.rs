//! Condition context: authentication material supplied at decryption time
//!
//! A context maps `:name` parameters to values. `:userAddress` carries an
//! `AuthSignature`, a signed attestation binding the requester's address to
//! the key that signed it. Contexts are built per decryption attempt and
//! never persisted.

use crate::{
    condition::USER_ADDRESS_PARAM,
    keys::{address_for, normalize_address, verify_signature, SigningIdentity},
    AccessError, Result,
};
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::time::{SystemTime, UNIX_EPOCH};

/// Signature scheme tag carried by attestations
pub const ATTESTATION_SCHEME: &str = "ed25519-attestation";

/// A signed statement that the holder of `public_key` controls `address`
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSignature {
    pub address: String,
    pub public_key: String,
    pub message: String,
    pub signature: String,
    pub scheme: String,
}

impl AuthSignature {
    /// Verify the attestation and return the normalized address it proves
    pub fn verify(&self) -> Result<String> {
        if self.scheme != ATTESTATION_SCHEME {
            return Err(AccessError::InvalidKey(format!(
                "unsupported attestation scheme: {}",
                self.scheme
            )));
        }
        let engine = &base64::engine::general_purpose::STANDARD;
        let public_key = engine.decode(&self.public_key)?;
        let signature = engine.decode(&self.signature)?;
        verify_signature(&public_key, self.message.as_bytes(), &signature)?;

        let pk: [u8; 32] = public_key
            .as_slice()
            .try_into()
            .map_err(|_| AccessError::InvalidKey("public key must be 32 bytes".to_string()))?;
        let verifying_key = ed25519_dalek::VerifyingKey::from_bytes(&pk)
            .map_err(|e| AccessError::InvalidKey(e.to_string()))?;

        let claimed = normalize_address(&self.address)?;
        if address_for(&verifying_key) != claimed {
            return Err(AccessError::SignatureVerification);
        }
        Ok(claimed)
    }
}

impl std::fmt::Debug for AuthSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSignature")
            .field("address", &self.address)
            .field("scheme", &self.scheme)
            .finish_non_exhaustive()
    }
}

/// Produces attestations for a signing identity
#[derive(Clone, Debug)]
pub struct AuthProvider {
    identity: SigningIdentity,
}

impl AuthProvider {
    pub fn new(identity: SigningIdentity) -> Self {
        Self { identity }
    }

    /// The address attestations will prove
    pub fn address(&self) -> String {
        self.identity.address()
    }

    /// Sign a fresh attestation scoped to a network domain
    pub fn attest(&self, domain: &str) -> AuthSignature {
        let issued_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let mut nonce = [0u8; 16];
        rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut nonce);

        let address = self.identity.address();
        let message = format!(
            "portalfs requests proof of control of account:\n{}\n\nDomain: {}\nIssued At: {}\nNonce: {}",
            address,
            domain,
            issued_at,
            hex::encode(nonce)
        );
        let engine = &base64::engine::general_purpose::STANDARD;

        AuthSignature {
            address,
            public_key: engine.encode(self.identity.public_key()),
            signature: engine.encode(self.identity.sign(message.as_bytes())),
            message,
            scheme: ATTESTATION_SCHEME.to_string(),
        }
    }
}

/// Per-decryption context parameters
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConditionContext {
    params: BTreeMap<String, Value>,
}

impl ConditionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a raw context parameter (`name` must start with `:`)
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Attach an attestation as `:userAddress`
    pub fn with_auth(mut self, auth: AuthSignature) -> Self {
        // AuthSignature is plain strings, so this conversion cannot fail
        let value = serde_json::to_value(auth).unwrap_or(Value::Null);
        self.params.insert(USER_ADDRESS_PARAM.to_string(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.params.contains_key(name)
    }

    /// The `:userAddress` attestation, if present
    pub fn user_auth(&self) -> Option<Result<AuthSignature>> {
        self.params.get(USER_ADDRESS_PARAM).map(|value| {
            serde_json::from_value(value.clone()).map_err(|e| {
                AccessError::InvalidKey(format!("malformed {} attestation: {}", USER_ADDRESS_PARAM, e))
            })
        })
    }

    /// Required parameters this context does not provide
    pub fn missing<'a>(&self, required: &'a BTreeSet<String>) -> Vec<&'a str> {
        required
            .iter()
            .filter(|name| !self.params.contains_key(name.as_str()))
            .map(String::as_str)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

impl std::fmt::Debug for ConditionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConditionContext")
            .field("params", &self.params.keys().collect::<Vec<_>>())
            .finish()
    }
}
