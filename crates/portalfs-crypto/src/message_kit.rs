//! Message kit wire format
//!
//! ```text
//! ┌────────┬─────────┬──────────────┬──────────────┬────────────┐
//! │ "PFMK" │ version │ header len   │ header JSON  │ ciphertext │
//! │ 4 B    │ 1 B     │ 4 B (BE u32) │ n B          │ rest       │
//! └────────┴─────────┴──────────────┴──────────────┴────────────┘
//! ```
//!
//! The header JSON is bound to the ciphertext as AEAD associated data.

use crate::{condition::Condition, network::Domain, AccessError, Result};
use serde::{Deserialize, Serialize};

/// Leading magic bytes of every kit
pub const MESSAGE_KIT_MAGIC: &[u8; 4] = b"PFMK";

/// Current wire format version
pub const MESSAGE_KIT_VERSION: u8 = 1;

const PREFIX_LEN: usize = 4 + 1 + 4;

/// Maximum header size accepted when parsing
pub const MAX_HEADER_LEN: usize = 64 * 1024;

/// Kit header: everything a decrypting node needs besides the ciphertext
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KitHeader {
    pub ritual_id: u32,
    pub domain: Domain,
    pub condition: Condition,
    /// Base64 AEAD nonce
    pub nonce: String,
    /// Address of the identity that produced the kit
    pub encryptor: String,
}

impl KitHeader {
    /// Serialized header bytes (also the AEAD associated data)
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// An encrypted message together with its header
#[derive(Clone, Debug, PartialEq)]
pub struct MessageKit {
    header: KitHeader,
    raw_header: Vec<u8>,
    ciphertext: Vec<u8>,
}

impl MessageKit {
    /// Assemble a kit; `ciphertext` must have been sealed with `header.to_bytes()` as AAD
    pub fn new(header: KitHeader, ciphertext: Vec<u8>) -> Result<Self> {
        let raw_header = header.to_bytes()?;
        Ok(Self {
            header,
            raw_header,
            ciphertext,
        })
    }

    pub fn header(&self) -> &KitHeader {
        &self.header
    }

    /// Header bytes exactly as they appear on the wire
    pub fn associated_data(&self) -> &[u8] {
        &self.raw_header
    }

    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    /// Whether `bytes` start with the kit magic
    pub fn is_message_kit(bytes: &[u8]) -> bool {
        bytes.len() >= PREFIX_LEN && &bytes[..4] == MESSAGE_KIT_MAGIC
    }

    /// Encode to the wire format
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(PREFIX_LEN + self.raw_header.len() + self.ciphertext.len());
        out.extend_from_slice(MESSAGE_KIT_MAGIC);
        out.push(MESSAGE_KIT_VERSION);
        out.extend_from_slice(&(self.raw_header.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.raw_header);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Decode from the wire format
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if !Self::is_message_kit(bytes) {
            return Err(AccessError::InvalidCiphertext(
                "not a message kit (bad magic or truncated prefix)".to_string(),
            ));
        }
        let version = bytes[4];
        if version != MESSAGE_KIT_VERSION {
            return Err(AccessError::InvalidCiphertext(format!(
                "unsupported message kit version {}",
                version
            )));
        }

        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&bytes[5..PREFIX_LEN]);
        let header_len = u32::from_be_bytes(len_bytes) as usize;
        if header_len > MAX_HEADER_LEN || bytes.len() < PREFIX_LEN + header_len {
            return Err(AccessError::InvalidCiphertext(format!(
                "header length {} out of range",
                header_len
            )));
        }

        let raw_header = bytes[PREFIX_LEN..PREFIX_LEN + header_len].to_vec();
        let header: KitHeader = serde_json::from_slice(&raw_header)
            .map_err(|e| AccessError::InvalidCiphertext(format!("bad header: {}", e)))?;

        Ok(Self {
            header,
            raw_header,
            ciphertext: bytes[PREFIX_LEN + header_len..].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_kit() -> MessageKit {
        let header = KitHeader {
            ritual_id: 27,
            domain: Domain::Lynx,
            condition: Condition::native_balance_at_least(0).on_chain(80002),
            nonce: "AAAAAAAAAAAAAAAA".to_string(),
            encryptor: "0x0000000000000000000000000000000000000001".to_string(),
        };
        MessageKit::new(header, vec![1, 2, 3, 4]).unwrap()
    }

    #[test]
    fn test_wire_format_layout() {
        let kit = sample_kit();
        let bytes = kit.to_bytes();

        assert_eq!(&bytes[..4], MESSAGE_KIT_MAGIC);
        assert_eq!(bytes[4], MESSAGE_KIT_VERSION);
        assert_eq!(MessageKit::from_bytes(&bytes).unwrap(), kit);
    }

    #[test]
    fn test_rejects_plain_bytes() {
        assert!(!MessageKit::is_message_kit(b"Hello World"));
        assert!(matches!(
            MessageKit::from_bytes(b"Hello World"),
            Err(AccessError::InvalidCiphertext(_))
        ));
    }

    #[test]
    fn test_rejects_truncated_header() {
        let mut bytes = sample_kit().to_bytes();
        bytes.truncate(PREFIX_LEN + 3);
        assert!(MessageKit::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_rejects_unknown_version() {
        let mut bytes = sample_kit().to_bytes();
        bytes[4] = 9;
        assert!(MessageKit::from_bytes(&bytes).is_err());
    }
}
