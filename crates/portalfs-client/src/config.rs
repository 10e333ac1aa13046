//! Agent configuration

use crate::error::{AgentError, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Default bound on storage downloads
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Default directory for persisted portal credentials
pub const DEFAULT_CREDENTIALS_DIR: &str = ".portalfs/credentials";

/// Agent configuration
#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// Portal namespace used by `Agent::setup_default`
    pub namespace: Option<String>,
    /// Expected chain name; construction fails if the chain client reports another
    pub chain: Option<String>,
    /// Where `FileCredentialStore` keeps `<namespace>-<chain>.json` records
    pub credentials_dir: PathBuf,
    /// Upper bound for a single storage download
    pub download_timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            chain: None,
            credentials_dir: PathBuf::from(DEFAULT_CREDENTIALS_DIR),
            download_timeout: DEFAULT_DOWNLOAD_TIMEOUT,
        }
    }
}

impl AgentConfig {
    /// Create a config for a namespace
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            ..Default::default()
        }
    }

    /// Load from `PORTALFS_NAMESPACE`, `PORTALFS_CHAIN` and `PORTALFS_CREDENTIALS_DIR`
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        let mut config = Self::default();
        config.namespace = std::env::var("PORTALFS_NAMESPACE").ok();
        config.chain = std::env::var("PORTALFS_CHAIN").ok();
        if let Ok(dir) = std::env::var("PORTALFS_CREDENTIALS_DIR") {
            config.credentials_dir = PathBuf::from(dir);
        }
        config
    }

    pub fn with_chain(mut self, chain: impl Into<String>) -> Self {
        self.chain = Some(chain.into());
        self
    }

    pub fn with_credentials_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.credentials_dir = dir.into();
        self
    }

    /// Set the storage download bound
    pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.download_timeout.is_zero() {
            return Err(AgentError::Configuration(
                "download timeout must be greater than zero".to_string(),
            ));
        }
        if let Some(chain) = &self.chain {
            if chain.trim().is_empty() {
                return Err(AgentError::Configuration(
                    "chain name must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AgentConfig::new("notes");

        assert_eq!(config.namespace.as_deref(), Some("notes"));
        assert_eq!(config.download_timeout, Duration::from_secs(30));
        assert_eq!(config.credentials_dir, PathBuf::from(DEFAULT_CREDENTIALS_DIR));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = AgentConfig::default().with_download_timeout(Duration::ZERO);
        assert!(matches!(config.validate(), Err(AgentError::Configuration(_))));
    }
}
