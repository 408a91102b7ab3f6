//! OpenAI-compatible HTTP adapter for embedding generation.

use super::{EmbeddingClient, EmbeddingError};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

/// Batched HTTP client for an OpenAI-compatible `/embeddings` endpoint.
///
/// Constructed once at startup and shared across ingestion runs; the
/// orchestrator receives it as an injected adapter rather than building
/// clients ad hoc per request.
pub struct OpenAiEmbeddingClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    dimension: usize,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiEmbeddingClient {
    /// Construct a new client against the given provider base URL.
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        model: &str,
        dimension: usize,
    ) -> Result<Self, EmbeddingError> {
        let client = Client::builder().user_agent("docflow/0.1").build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
            dimension,
        })
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbeddingClient {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let expected = texts.len();
        tracing::debug!(
            model = %self.model,
            batch = expected,
            "Requesting embeddings"
        );

        let mut request = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .json(&json!({
                "model": self.model,
                "input": texts,
            }));
        if let Some(api_key) = self.api_key.as_deref().filter(|key| !key.is_empty()) {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = EmbeddingError::UnexpectedStatus { status, body };
            tracing::warn!(error = %error, "Embedding provider request failed");
            return Err(error);
        }

        let payload: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|err| EmbeddingError::MalformedResponse(err.to_string()))?;

        if payload.data.len() != expected {
            return Err(EmbeddingError::MalformedResponse(format!(
                "expected {expected} vectors, provider returned {}",
                payload.data.len()
            )));
        }

        let mut data = payload.data;
        data.sort_by_key(|datum| datum.index);

        let mut vectors = Vec::with_capacity(data.len());
        for datum in data {
            if datum.embedding.len() != self.dimension {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: self.dimension,
                    actual: datum.embedding.len(),
                });
            }
            vectors.push(datum.embedding);
        }

        Ok(vectors)
    }
}
