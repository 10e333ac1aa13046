//! Authenticated encryption with AES-256-GCM
//!
//! Message kits seal their payload under a ritual key, binding the kit header
//! as associated data so the embedded condition cannot be swapped.

use crate::{
    keys::{RitualKey, KEY_SIZE, NONCE_SIZE},
    AccessError, Result,
};
use aes_gcm::{
    aead::{Aead as AeadTrait, Payload},
    Aes256Gcm, KeyInit,
};
use base64::Engine;
use rand::rngs::OsRng;
use zeroize::Zeroizing;

/// A nonce for AEAD encryption
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Nonce {
    bytes: [u8; NONCE_SIZE],
}

impl Nonce {
    /// Generate a random nonce
    pub fn generate() -> Self {
        let mut bytes = [0u8; NONCE_SIZE];
        rand::RngCore::fill_bytes(&mut OsRng, &mut bytes);
        Self { bytes }
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != NONCE_SIZE {
            return Err(AccessError::InvalidNonce(format!(
                "nonce must be {} bytes, got {}",
                NONCE_SIZE,
                bytes.len()
            )));
        }
        let mut arr = [0u8; NONCE_SIZE];
        arr.copy_from_slice(bytes);
        Ok(Self { bytes: arr })
    }

    /// Get the nonce bytes
    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.bytes
    }

    /// Encode as base64
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.bytes)
    }

    /// Decode from base64
    pub fn from_base64(s: &str) -> Result<Self> {
        let bytes = base64::engine::general_purpose::STANDARD.decode(s)?;
        Self::from_bytes(&bytes)
    }
}

/// AES-256-GCM encryption/decryption bound to a ritual key
pub struct Aead {
    key: Zeroizing<[u8; KEY_SIZE]>,
}

impl Aead {
    /// Create a new AEAD instance for the given key
    pub fn new(key: &RitualKey) -> Self {
        Self {
            key: Zeroizing::new(*key.as_bytes()),
        }
    }

    fn cipher(&self) -> Result<Aes256Gcm> {
        Aes256Gcm::new_from_slice(&self.key[..])
            .map_err(|e| AccessError::InvalidKey(e.to_string()))
    }

    /// Encrypt data with the given nonce and associated data
    pub fn encrypt_with_aad(&self, nonce: &Nonce, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        let nonce_arr = aes_gcm::Nonce::from_slice(nonce.as_bytes());
        self.cipher()?
            .encrypt(nonce_arr, Payload { msg: plaintext, aad })
            .map_err(|_| AccessError::InvalidCiphertext("AES-GCM seal failed".to_string()))
    }

    /// Decrypt data with the given nonce and associated data
    pub fn decrypt_with_aad(&self, nonce: &Nonce, ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        let nonce_arr = aes_gcm::Nonce::from_slice(nonce.as_bytes());
        self.cipher()?
            .decrypt(nonce_arr, Payload { msg: ciphertext, aad })
            .map_err(|_| {
                AccessError::InvalidCiphertext("authentication tag mismatch".to_string())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aead_with_aad() {
        let key = RitualKey::generate();
        let nonce = Nonce::generate();

        let aead = Aead::new(&key);
        let ciphertext = aead.encrypt_with_aad(&nonce, b"secret data", b"header").unwrap();
        let decrypted = aead.decrypt_with_aad(&nonce, &ciphertext, b"header").unwrap();

        assert_eq!(b"secret data".as_slice(), decrypted.as_slice());
    }

    #[test]
    fn test_wrong_aad_fails() {
        let key = RitualKey::generate();
        let nonce = Nonce::generate();

        let aead = Aead::new(&key);
        let ciphertext = aead.encrypt_with_aad(&nonce, b"secret data", b"correct").unwrap();
        let result = aead.decrypt_with_aad(&nonce, &ciphertext, b"wrong");

        assert!(matches!(result, Err(AccessError::InvalidCiphertext(_))));
    }

    #[test]
    fn test_nonce_base64() {
        let nonce = Nonce::generate();
        let parsed = Nonce::from_base64(&nonce.to_base64()).unwrap();
        assert_eq!(nonce, parsed);
        assert!(Nonce::from_bytes(&[0u8; 4]).is_err());
    }
}
