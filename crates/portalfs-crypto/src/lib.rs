//! # Portalfs Crypto
//!
//! Access-controlled encryption for portalfs files.
//!
//! This crate provides:
//! - **AccessProvider**: the capability trait the file orchestrator encrypts and decrypts through
//! - **Conditions**: opaque `AccessCondition` values and the typed `Condition` tree backends evaluate
//! - **Threshold adapter**: `ThresholdAccessProvider`, lazily initialized on a shared `BackendRuntime`
//! - **Local network**: `LocalThresholdNetwork`, an in-process threshold network for development
//!
//! ## Example
//!
//! ```rust,ignore
//! use portalfs_crypto::{
//!     AccessProvider, Condition, Domain, LocalThresholdNetwork, SigningIdentity,
//!     ThresholdAccessProvider, ThresholdConfig,
//! };
//! use std::sync::Arc;
//!
//! let network = Arc::new(LocalThresholdNetwork::new().with_ritual(Domain::Lynx, 27));
//! let config = ThresholdConfig::new(27, "lynx", "https://rpc-amoy.polygon.technology")
//!     .with_signer(SigningIdentity::generate());
//! let provider = ThresholdAccessProvider::new(config, network)?;
//!
//! let condition = Condition::native_balance_at_least(0).into();
//! let ciphertext = provider.encrypt(b"Secret", &condition).await?;
//! let plaintext = provider.decrypt(&ciphertext, None).await?;
//! ```

pub mod condition;
pub mod context;
pub mod error;
pub mod keys;
pub mod local;
pub mod message_kit;
pub mod network;
pub mod provider;
pub mod runtime;
pub mod symmetric;
pub mod threshold;

pub use condition::{AccessCondition, Comparator, Condition, LogicalOperator, USER_ADDRESS_PARAM};
pub use context::{AuthProvider, AuthSignature, ConditionContext};
pub use error::{AccessError, Result};
pub use keys::{RitualKey, SigningIdentity};
pub use local::LocalThresholdNetwork;
pub use message_kit::{KitHeader, MessageKit};
pub use network::{Domain, DomainSession, NetworkError, RitualStatus, ThresholdNetwork};
pub use provider::AccessProvider;
pub use runtime::{BackendRuntime, InitState};
pub use threshold::{ThresholdAccessProvider, ThresholdConfig, THRESHOLD_PROVIDER_TYPE};
