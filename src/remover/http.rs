//! Removal capability backed by an HTTP endpoint
//!
//! The raw image is POSTed with its declared media type as `Content-Type`;
//! a successful response body is the processed image.

use super::{BackgroundRemover, ProcessedImage, DEFAULT_OUTPUT_MEDIA_TYPE};
use crate::types::FileCandidate;
use anyhow::{bail, Context};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, CONTENT_TYPE};

/// Sends images to a remote removal service
#[derive(Debug, Clone)]
pub struct HttpRemover {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpRemover {
    /// Create a remover posting to `endpoint`
    pub fn new<S: Into<String>>(endpoint: S) -> Self {
        Self::with_client(reqwest::Client::new(), endpoint)
    }

    /// Create a remover with a preconfigured client (proxies, TLS, timeouts)
    pub fn with_client<S: Into<String>>(client: reqwest::Client, endpoint: S) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Media type reported by the response, without parameters
fn response_media_type(headers: &HeaderMap) -> String {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_OUTPUT_MEDIA_TYPE)
        .to_string()
}

#[async_trait]
impl BackgroundRemover for HttpRemover {
    async fn remove(&self, file: &FileCandidate) -> anyhow::Result<ProcessedImage> {
        tracing::debug!(
            endpoint = %self.endpoint,
            bytes = file.len(),
            media_type = %file.media_type,
            "Posting image to removal endpoint"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, file.media_type.as_str())
            .body(file.bytes.to_vec())
            .send()
            .await
            .with_context(|| format!("request to {} failed", self.endpoint))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("{} responded with {}: {}", self.endpoint, status, body.trim());
        }

        let media_type = response_media_type(response.headers());
        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("failed to read response body from {}", self.endpoint))?;

        Ok(ProcessedImage::new(bytes.to_vec(), media_type))
    }

    fn name(&self) -> &str {
        "http"
    }
}
