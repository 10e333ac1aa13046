//! CID (Content Identifier) utilities
//!
//! References handed out by storage providers are protocol-prefixed CIDs,
//! e.g. `ipfs://bafkrei...`.

use crate::{StorageError, IPFS_PROTOCOL};
use cid::{Cid, Version};
use multihash_codetable::{Code, MultihashDigest};

/// Multicodec code for raw binary data
pub const RAW_CODEC: u64 = 0x55;

/// Create a CIDv1 (raw, sha2-256) for the data
pub fn create_cid(data: &[u8]) -> Cid {
    Cid::new_v1(RAW_CODEC, Code::Sha2_256.digest(data))
}

/// Verify that data matches a CID
pub fn verify_cid(data: &[u8], cid: &Cid) -> bool {
    cid.version() == Version::V1 && create_cid(data) == *cid
}

/// Parse a CID from a string
pub fn parse_cid(s: &str) -> Result<Cid, StorageError> {
    s.parse()
        .map_err(|e: cid::Error| StorageError::InvalidReference(format!("{}: {}", s, e)))
}

/// Protocol-prefixed reference for a CID
pub fn reference_for(cid: &Cid) -> String {
    format!("{}{}", IPFS_PROTOCOL, cid)
}

/// Strip the protocol prefix from a reference (bare CIDs are accepted)
pub fn strip_protocol(reference: &str) -> &str {
    reference
        .trim()
        .strip_prefix(IPFS_PROTOCOL)
        .unwrap_or(reference.trim())
}

/// Extract and parse the CID a reference points to
pub fn cid_from_reference(reference: &str) -> Result<Cid, StorageError> {
    parse_cid(strip_protocol(reference))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_cid() {
        let cid = create_cid(b"Hello, World!");

        assert_eq!(cid.version(), Version::V1);
        assert_eq!(cid.codec(), RAW_CODEC);
        assert!(cid.to_string().starts_with("bafkrei"));
    }

    #[test]
    fn test_cid_consistency() {
        assert_eq!(create_cid(b"test data"), create_cid(b"test data"));
        assert_ne!(create_cid(b"data1"), create_cid(b"data2"));
    }

    #[test]
    fn test_verify_cid() {
        let cid = create_cid(b"verify me");

        assert!(verify_cid(b"verify me", &cid));
        assert!(!verify_cid(b"wrong data", &cid));
    }

    #[test]
    fn test_reference_parsing() {
        let cid = create_cid(b"test");
        let reference = reference_for(&cid);

        assert!(reference.starts_with("ipfs://"));
        assert_eq!(cid_from_reference(&reference).unwrap(), cid);
        assert_eq!(cid_from_reference(&cid.to_string()).unwrap(), cid);
    }

    #[test]
    fn test_sentinel_is_not_a_cid() {
        assert!(matches!(
            cid_from_reference("ipfs://deleted"),
            Err(StorageError::InvalidReference(_))
        ));
    }
}
