//! HTTP access to the package repository.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::error::{Result, SnowsampleError};

/// Default timeout for repository requests.
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Fetches metadata documents and artifact bytes from a repository.
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    /// GETs a text document (version metadata).
    async fn fetch_text(&self, url: &str) -> Result<String>;

    /// GETs a binary artifact.
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>>;
}

/// `ArtifactFetcher` over plain HTTP(S) GET. Failures are not retried.
#[derive(Debug, Clone)]
pub struct HttpArtifactFetcher {
    client: Client,
}

impl HttpArtifactFetcher {
    /// Creates a fetcher with the default timeout.
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT_SECS)
    }

    /// Creates a fetcher with the given request timeout.
    pub fn with_timeout(timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                SnowsampleError::provision(format!("Failed to create HTTP client: {e}"))
            })?;
        Ok(Self { client })
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        debug!(%url, "GET");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SnowsampleError::provision(format!("Request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SnowsampleError::provision(format!(
                "GET {url} returned {status}"
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl ArtifactFetcher for HttpArtifactFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String> {
        self.get(url)
            .await?
            .text()
            .await
            .map_err(|e| SnowsampleError::provision(format!("Failed to read {url}: {e}")))
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let bytes = self
            .get(url)
            .await?
            .bytes()
            .await
            .map_err(|e| SnowsampleError::provision(format!("Failed to download {url}: {e}")))?;
        Ok(bytes.to_vec())
    }
}
