//! Pinata storage provider
//!
//! Uploads go through the Pinata pinning API, reads through an IPFS gateway:
//! - `POST {api}/pinning/pinFileToIPFS` (multipart, bearer JWT)
//! - `GET {gateway}/ipfs/{cid}`
//! - `DELETE {api}/pinning/unpin/{cid}`
//! - `GET {api}/data/testAuthentication`

use crate::{
    cid_utils::{parse_cid, strip_protocol},
    BlobData, Downloaded, Result, StorageError, StorageProvider, IPFS_PROTOCOL,
};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header::CONTENT_TYPE, multipart, Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Default Pinata API endpoint
pub const DEFAULT_PINATA_API_URL: &str = "https://api.pinata.cloud";

/// Configuration for `PinataStorage`
#[derive(Clone)]
pub struct PinataConfig {
    /// Pinata API JWT
    pub jwt: String,
    /// Gateway base URL (a bare host gets `https://`)
    pub gateway_url: String,
    /// Pinata API base URL
    pub api_url: String,
    /// Request timeout
    pub timeout: Duration,
}

impl PinataConfig {
    pub fn new(jwt: impl Into<String>, gateway: impl Into<String>) -> Self {
        Self {
            jwt: jwt.into(),
            gateway_url: gateway.into(),
            api_url: DEFAULT_PINATA_API_URL.to_string(),
            timeout: Duration::from_secs(60),
        }
    }

    /// Load from `PINATA_JWT`, `PINATA_GATEWAY` and optional `PINATA_API_URL`
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let jwt = std::env::var("PINATA_JWT")
            .map_err(|_| StorageError::Configuration("PINATA_JWT is not set".to_string()))?;
        let gateway = std::env::var("PINATA_GATEWAY")
            .map_err(|_| StorageError::Configuration("PINATA_GATEWAY is not set".to_string()))?;

        let mut config = Self::new(jwt, gateway);
        if let Ok(api_url) = std::env::var("PINATA_API_URL") {
            config = config.with_api_url(api_url);
        }
        Ok(config)
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.jwt.trim().is_empty() {
            return Err(StorageError::Configuration("Pinata JWT is required".to_string()));
        }
        if self.gateway_url.trim().is_empty() {
            return Err(StorageError::Configuration(
                "Pinata gateway is required".to_string(),
            ));
        }
        for (field, value) in [("gateway", self.gateway_base()), ("api", self.api_base())] {
            url::Url::parse(&value).map_err(|e| {
                StorageError::Configuration(format!("invalid {} URL '{}': {}", field, value, e))
            })?;
        }
        Ok(())
    }

    fn gateway_base(&self) -> String {
        let gateway = self.gateway_url.trim().trim_end_matches('/');
        if gateway.starts_with("http://") || gateway.starts_with("https://") {
            gateway.to_string()
        } else {
            format!("https://{}", gateway)
        }
    }

    fn api_base(&self) -> String {
        self.api_url.trim().trim_end_matches('/').to_string()
    }
}

impl std::fmt::Debug for PinataConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinataConfig")
            .field("gateway_url", &self.gateway_url)
            .field("api_url", &self.api_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Response of `pinFileToIPFS`
#[derive(Debug, Deserialize)]
struct PinFileResponse {
    #[serde(rename = "IpfsHash")]
    ipfs_hash: String,
    #[serde(rename = "PinSize", default)]
    pin_size: u64,
}

/// IPFS storage backed by Pinata
#[derive(Clone)]
pub struct PinataStorage {
    client: Client,
    config: PinataConfig,
    gateway: String,
    api: String,
}

impl PinataStorage {
    /// Create a new Pinata storage client
    pub fn new(config: PinataConfig) -> Result<Self> {
        config.validate()?;
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            gateway: config.gateway_base(),
            api: config.api_base(),
            config,
        })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(PinataConfig::from_env()?)
    }

    fn auth_header(&self) -> String {
        format!("Bearer {}", self.config.jwt)
    }

    fn cid_of(reference: &str) -> Result<String> {
        let cid = parse_cid(strip_protocol(reference))?;
        Ok(cid.to_string())
    }

    async fn get(&self, reference: &str) -> Result<reqwest::Response> {
        let cid = Self::cid_of(reference)?;
        let url = format!("{}/ipfs/{}", self.gateway, cid);

        let response = self.client.get(&url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(StorageError::NotFound(reference.to_string()));
        }
        if !response.status().is_success() {
            let status = response.status();
            let error = response.text().await.unwrap_or_default();
            return Err(StorageError::Http(format!(
                "gateway returned {} for {}: {}",
                status, cid, error
            )));
        }
        Ok(response)
    }
}

fn is_text_content_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence.starts_with("text/") || essence == "application/json"
}

#[async_trait]
impl StorageProvider for PinataStorage {
    #[instrument(skip(self, content), fields(size = content.len()))]
    async fn upload(&self, file_name: &str, content: Bytes) -> Result<String> {
        let url = format!("{}/pinning/pinFileToIPFS", self.api);

        let part = multipart::Part::bytes(content.to_vec())
            .file_name(file_name.to_string())
            .mime_str("application/octet-stream")
            .map_err(|e| StorageError::Upload(e.to_string()))?;
        let form = multipart::Form::new()
            .part("file", part)
            .text("pinataMetadata", json!({ "name": file_name }).to_string())
            .text("pinataOptions", json!({ "cidVersion": 1 }).to_string());

        let response = self
            .client
            .post(&url)
            .header("Authorization", self.auth_header())
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error = response.text().await.unwrap_or_default();
            return Err(StorageError::Upload(format!(
                "Pinata returned {}: {}",
                status, error
            )));
        }

        let pinned: PinFileResponse = response
            .json()
            .await
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        info!(cid = %pinned.ipfs_hash, pin_size = pinned.pin_size, "Pinned file to IPFS");
        Ok(format!("{}{}", IPFS_PROTOCOL, pinned.ipfs_hash))
    }

    #[instrument(skip(self))]
    async fn download(&self, reference: &str) -> Result<Downloaded> {
        let response = self.get(reference).await?;
        let text = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(is_text_content_type)
            .unwrap_or(false);

        let bytes = response.bytes().await?;
        let data = if text {
            match String::from_utf8(bytes.to_vec()) {
                Ok(text) => BlobData::Text(text),
                Err(_) => BlobData::Bytes(bytes),
            }
        } else {
            BlobData::Bytes(bytes)
        };
        debug!(size = data.len(), "Downloaded blob");
        Ok(Downloaded { data })
    }

    #[instrument(skip(self))]
    async fn download_bytes(&self, reference: &str) -> Result<Bytes> {
        let response = self.get(reference).await?;
        Ok(response.bytes().await?)
    }

    #[instrument(skip(self))]
    async fn unpin(&self, reference: &str) -> Result<String> {
        let cid = Self::cid_of(reference).map_err(|e| StorageError::Unpin(e.to_string()))?;
        let url = format!("{}/pinning/unpin/{}", self.api, cid);

        let response = self
            .client
            .delete(&url)
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| StorageError::Unpin(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error = response.text().await.unwrap_or_default();
            return Err(StorageError::Unpin(format!(
                "Pinata refused to unpin {} ({}): {}",
                cid, status, error
            )));
        }

        Ok(cid)
    }

    async fn protocol(&self) -> Result<String> {
        Ok(IPFS_PROTOCOL.to_string())
    }

    async fn is_connected(&self) -> bool {
        let url = format!("{}/data/testAuthentication", self.api);
        match self
            .client
            .get(&url)
            .header("Authorization", self.auth_header())
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!(status = %response.status(), "Pinata authentication check failed");
                false
            }
            Err(e) => {
                warn!(error = %e, "Pinata unreachable");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_creation() {
        let config = PinataConfig::new("jwt", "example.mypinata.cloud");

        assert_eq!(config.api_url, DEFAULT_PINATA_API_URL);
        assert_eq!(config.gateway_base(), "https://example.mypinata.cloud");
    }

    #[test]
    fn test_config_requires_jwt() {
        let config = PinataConfig::new("", "example.mypinata.cloud");
        assert!(matches!(
            PinataStorage::new(config),
            Err(StorageError::Configuration(_))
        ));
    }

    #[test]
    fn test_debug_hides_jwt() {
        let config = PinataConfig::new("super-secret-jwt", "gw.example.com");
        assert!(!format!("{:?}", config).contains("super-secret-jwt"));
    }

    #[test]
    fn test_text_content_types() {
        assert!(is_text_content_type("text/plain; charset=utf-8"));
        assert!(is_text_content_type("application/json"));
        assert!(!is_text_content_type("application/octet-stream"));
    }
}
