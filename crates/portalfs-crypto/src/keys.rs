//! Key material for access-controlled encryption
//!
//! - `RitualKey`: symmetric key material produced by a ritual and held by the network
//! - `SigningIdentity`: ed25519 identity used to authenticate a requester

use crate::{AccessError, Result};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of a symmetric key in bytes (256 bits)
pub const KEY_SIZE: usize = 32;

/// Size of a nonce in bytes (96 bits for AES-GCM)
pub const NONCE_SIZE: usize = 12;

/// Size of an account address in bytes
pub const ADDRESS_SIZE: usize = 20;

/// Symmetric key material bound to one ritual
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct RitualKey {
    key: [u8; KEY_SIZE],
}

impl RitualKey {
    /// Generate a new random key
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_SIZE];
        rand::RngCore::fill_bytes(&mut OsRng, &mut key);
        Self { key }
    }

    /// Create a key from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(AccessError::InvalidKey(format!(
                "ritual key must be {} bytes, got {}",
                KEY_SIZE,
                bytes.len()
            )));
        }
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(bytes);
        Ok(Self { key })
    }

    /// Get the key bytes
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }
}

/// Derive the `0x`-prefixed account address for an ed25519 verifying key
pub fn address_for(verifying_key: &VerifyingKey) -> String {
    let digest = Sha256::digest(verifying_key.as_bytes());
    format!("0x{}", hex::encode(&digest[digest.len() - ADDRESS_SIZE..]))
}

/// Normalize an address for comparison (lowercase, `0x` prefix)
pub fn normalize_address(address: &str) -> Result<String> {
    let trimmed = address.trim();
    let body = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let bytes = hex::decode(body)?;
    if bytes.len() != ADDRESS_SIZE {
        return Err(AccessError::InvalidKey(format!(
            "address must be {} bytes, got {}",
            ADDRESS_SIZE,
            bytes.len()
        )));
    }
    Ok(format!("0x{}", hex::encode(bytes)))
}

/// The identity an adapter signs authentication attestations with
#[derive(Clone)]
pub struct SigningIdentity {
    key: SigningKey,
}

impl SigningIdentity {
    /// Generate a new random identity
    pub fn generate() -> Self {
        Self {
            key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Create from a 32-byte secret
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| {
            AccessError::InvalidKey(format!(
                "signing key must be 32 bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self {
            key: SigningKey::from_bytes(&arr),
        })
    }

    /// Create from a hex-encoded secret (with or without `0x`)
    pub fn from_hex(secret: &str) -> Result<Self> {
        let secret = secret.trim();
        let body = secret.strip_prefix("0x").unwrap_or(secret);
        let bytes = hex::decode(body)?;
        Self::from_bytes(&bytes)
    }

    /// The account address this identity authenticates as
    pub fn address(&self) -> String {
        address_for(&self.key.verifying_key())
    }

    /// The public verifying key bytes
    pub fn public_key(&self) -> [u8; 32] {
        self.key.verifying_key().to_bytes()
    }

    /// Sign a message
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.key.sign(message).to_bytes()
    }

    /// Export the secret key (handle with care!)
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.key.to_bytes()
    }
}

impl std::fmt::Debug for SigningIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SigningIdentity({})", self.address())
    }
}

/// Verify an ed25519 signature against a raw public key
pub fn verify_signature(public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<()> {
    let pk: [u8; 32] = public_key
        .try_into()
        .map_err(|_| AccessError::InvalidKey("public key must be 32 bytes".to_string()))?;
    let verifying_key =
        VerifyingKey::from_bytes(&pk).map_err(|e| AccessError::InvalidKey(e.to_string()))?;
    let signature =
        Signature::from_slice(signature).map_err(|_| AccessError::SignatureVerification)?;
    verifying_key
        .verify(message, &signature)
        .map_err(|_| AccessError::SignatureVerification)
}
