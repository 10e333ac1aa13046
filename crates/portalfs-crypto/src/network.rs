//! Threshold-encryption network backend contract
//!
//! Implementations talk to a threshold network (or simulate one). The adapter in
//! `threshold` owns lifecycle and error translation; backends only move bytes.

use crate::{
    condition::Condition, context::ConditionContext, keys::SigningIdentity,
    message_kit::MessageKit, AccessError,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Network domains a ritual can live on
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    /// Development network
    Lynx,
    /// Test network
    Tapir,
    /// Production network
    Mainnet,
}

impl Domain {
    /// Every recognized domain
    pub const ALL: [Domain; 3] = [Domain::Lynx, Domain::Tapir, Domain::Mainnet];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lynx => "lynx",
            Self::Tapir => "tapir",
            Self::Mainnet => "mainnet",
        }
    }

    /// Chain id conditions default to when they do not name one
    pub fn default_chain_id(&self) -> u64 {
        match self {
            Self::Lynx | Self::Tapir => 80002, // Polygon Amoy
            Self::Mainnet => 137,              // Polygon PoS
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Domain::ALL
            .into_iter()
            .find(|d| d.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                AccessError::Configuration(format!(
                    "unknown domain '{}', expected one of: lynx, tapir, mainnet",
                    s
                ))
            })
    }
}

/// Handle returned by a successful domain handshake
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DomainSession {
    pub domain: Domain,
    pub session_id: String,
    pub porter_uris: Vec<String>,
}

/// Status of a ritual on a domain
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RitualStatus {
    Active,
    Expired,
    Unknown,
}

/// Errors reported by a threshold network backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    /// Network endpoints could not be reached
    #[error("network unreachable: {0}")]
    Unreachable(String),

    /// Too few nodes released decryption shares
    #[error("threshold of responses not met: {received} of {required}")]
    ThresholdNotMet { received: u32, required: u32 },

    /// The condition references context parameters that were not supplied
    #[error("missing context parameters: {}", .0.join(", "))]
    MissingContext(Vec<String>),

    /// The network refused the request
    #[error("request rejected: {0}")]
    Rejected(String),

    /// The request or response was malformed
    #[error("malformed payload: {0}")]
    Malformed(String),
}

/// A threshold-encryption network client
#[async_trait]
pub trait ThresholdNetwork: Send + Sync {
    /// Load shared backend modules (run at most once per process)
    async fn initialize(&self) -> Result<(), NetworkError>;

    /// Perform the domain handshake (run at most once per adapter)
    async fn connect(
        &self,
        domain: Domain,
        porter_uris: &[String],
    ) -> Result<DomainSession, NetworkError>;

    /// Cheap reachability probe for a domain
    async fn is_reachable(&self, domain: Domain) -> bool;

    /// Look up the status of a ritual
    async fn ritual_status(
        &self,
        domain: Domain,
        ritual_id: u32,
    ) -> Result<RitualStatus, NetworkError>;

    /// Encrypt a message under a condition with the ritual's public key material
    async fn encrypt(
        &self,
        session: &DomainSession,
        message: &[u8],
        condition: &Condition,
        ritual_id: u32,
        signer: &SigningIdentity,
    ) -> Result<MessageKit, NetworkError>;

    /// Request decryption shares and combine them
    async fn decrypt(
        &self,
        session: &DomainSession,
        kit: &MessageKit,
        context: Option<&ConditionContext>,
    ) -> Result<Vec<u8>, NetworkError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_parsing() {
        assert_eq!("lynx".parse::<Domain>().unwrap(), Domain::Lynx);
        assert_eq!("Mainnet".parse::<Domain>().unwrap(), Domain::Mainnet);
        assert!(matches!(
            "ropsten".parse::<Domain>(),
            Err(AccessError::Configuration(_))
        ));
    }

    #[test]
    fn test_default_chain_ids() {
        assert_eq!(Domain::Lynx.default_chain_id(), 80002);
        assert_eq!(Domain::Tapir.default_chain_id(), 80002);
        assert_eq!(Domain::Mainnet.default_chain_id(), 137);
    }

    #[test]
    fn test_missing_context_message() {
        let err = NetworkError::MissingContext(vec![":userAddress".to_string()]);
        assert_eq!(err.to_string(), "missing context parameters: :userAddress");
    }
}
