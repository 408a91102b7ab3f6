//! Embedding client abstraction and adapters.
//!
//! The pipeline talks to the embedding provider through the
//! [`EmbeddingClient`] trait so the orchestrator can be exercised against
//! stub providers in tests. The production adapter speaks the
//! OpenAI-compatible `/embeddings` wire format.

mod openai;

pub use openai::OpenAiEmbeddingClient;

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;

/// Errors raised by embedding providers.
///
/// Transient failures (rate limits, upstream hiccups, connection problems)
/// are eligible for bounded retry; everything else is permanent and escalates
/// immediately.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// HTTP layer failed before a response was received.
    #[error("Embedding request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// Provider responded with a non-success status.
    #[error("Unexpected embedding provider response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the provider.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Provider returned a payload the client could not interpret.
    #[error("Malformed embedding response: {0}")]
    MalformedResponse(String),
    /// Provider returned vectors of an unexpected dimensionality.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension the service was configured for.
        expected: usize,
        /// Dimension actually produced by the provider.
        actual: usize,
    },
}

impl EmbeddingError {
    /// Whether this failure is worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(err) => err.is_timeout() || err.is_connect() || err.is_request(),
            Self::UnexpectedStatus { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            Self::MalformedResponse(_) | Self::DimensionMismatch { .. } => false,
        }
    }
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce one embedding vector per supplied chunk of text, in order.
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}
