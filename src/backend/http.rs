//! Plain HTTP GET downloader.

use super::{error_from_response, Downloader};
use crate::error::Result;
use crate::PipelineError;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// Downloads a URL with a single GET request.
///
/// A 404 comes back as a fatal [`PipelineError::HttpError`]: the bulletin for
/// that date was not published, and asking again will not change that.
#[derive(Debug, Clone)]
pub struct HttpDownloader {
    client: Client,
}

impl HttpDownloader {
    /// A downloader whose requests give up after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("bulletin-digest/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    /// Use an existing client (its own timeout applies).
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        tracing::debug!(url, "GET");
        let resp = self.client.get(url).send().await?;

        if !resp.status().is_success() {
            let err = error_from_response(resp).await;
            if let PipelineError::HttpError { status: 404, .. } = err {
                tracing::error!(url, "bulletin not found");
            }
            return Err(err);
        }

        let bytes = resp.bytes().await?;
        if bytes.is_empty() {
            return Err(PipelineError::EmptyResponse(url.to_string()));
        }
        if !bytes.starts_with(b"%PDF") {
            tracing::warn!(url, "downloaded file does not look like a PDF");
        }
        tracing::debug!(url, bytes = bytes.len(), "download complete");
        Ok(bytes.to_vec())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
