//! Source payload retrieval.
//!
//! Uploads land in external blob storage; the pipeline only ever sees a
//! retrievable URL. This module downloads the full payload into memory so the
//! parser never has to assume a local file.

use reqwest::{Client, StatusCode};
use thiserror::Error;

/// Errors raised while fetching the uploaded payload.
#[derive(Debug, Error)]
pub enum FetchError {
    /// HTTP layer failed before a response was received.
    #[error("Failed to fetch source payload: {0}")]
    Http(#[from] reqwest::Error),
    /// Blob storage responded with a non-success status.
    #[error("Source URL returned status {status}")]
    UnexpectedStatus {
        /// HTTP status returned by the blob store.
        status: StatusCode,
    },
    /// The response completed but carried no bytes.
    #[error("Source URL returned an empty payload")]
    EmptyPayload,
}

/// Downloads uploaded payloads from blob storage.
pub struct SourceFetcher {
    client: Client,
}

impl SourceFetcher {
    /// Construct a fetcher with a long-lived HTTP client.
    pub fn new() -> Result<Self, FetchError> {
        let client = Client::builder().user_agent("docflow/0.1").build()?;
        Ok(Self { client })
    }

    /// Retrieve the complete payload behind `source_url`.
    pub async fn fetch(&self, source_url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(source_url).send().await?;
        let status = response.status();
        if !status.is_success() {
            tracing::warn!(url = source_url, %status, "Source fetch failed");
            return Err(FetchError::UnexpectedStatus { status });
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(FetchError::EmptyPayload);
        }

        tracing::debug!(url = source_url, bytes = bytes.len(), "Fetched source payload");
        Ok(bytes.to_vec())
    }
}
