//! Album art retrieval

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ArtError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Art server returned status {0}")]
    Status(u16),
}

/// Downloaded art with the headers the inlining policy needs
#[derive(Debug, Clone)]
pub struct FetchedArt {
    /// Content-Length as declared by the server, if any
    pub declared_length: Option<u64>,
    pub content_type: Option<String>,
    pub bytes: Arc<Vec<u8>>,
}

#[async_trait]
pub trait ArtClient: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedArt, ArtError>;
}

/// reqwest-backed art client
pub struct HttpArtClient {
    http_client: reqwest::Client,
}

impl HttpArtClient {
    pub fn new() -> Result<Self, ArtError> {
        let http_client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ArtError::Network(e.to_string()))?;
        Ok(Self { http_client })
    }
}

#[async_trait]
impl ArtClient for HttpArtClient {
    async fn fetch(&self, url: &str) -> Result<FetchedArt, ArtError> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| ArtError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ArtError::Status(status.as_u16()));
        }

        let declared_length = response.content_length();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ArtError::Network(e.to_string()))?;

        tracing::trace!(url, len = bytes.len(), ?declared_length, "Fetched album art");

        Ok(FetchedArt {
            declared_length,
            content_type,
            bytes: Arc::new(bytes.to_vec()),
        })
    }
}
