//! Object storage access over signed URLs

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use tracing::{debug, error};
use url::Url;

use crate::errors::AgentError;
use crate::http::api::BlobStore;
use crate::http::client::REQUEST_TIMEOUT;

/// Plain HTTP blob access; URLs carry their own credentials
#[derive(Debug, Clone)]
pub struct HttpBlobStore {
    client: Client,
}

impl HttpBlobStore {
    pub fn new() -> Result<Self, AgentError> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, AgentError> {
        debug!("GET {} (blob)", url);
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            error!("Blob download from {} failed: {}", url, status);
            return Err(AgentError::rejected(status.as_u16(), "blob download failed"));
        }
        Ok(response.bytes().await?.to_vec())
    }

    async fn put(&self, upload_url: &str, bytes: Vec<u8>) -> Result<(), AgentError> {
        debug!("PUT {} ({} bytes)", upload_url, bytes.len());
        let response = self
            .client
            .put(upload_url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(bytes)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Blob upload failed: {} - {}", status, body);
            return Err(AgentError::rejected(status.as_u16(), body));
        }
        Ok(())
    }
}
