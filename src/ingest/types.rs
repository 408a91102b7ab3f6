//! Core data types and error definitions for the ingestion pipeline.

use crate::chunking::ChunkingError;
use crate::embedding::EmbeddingError;
use crate::fetch::FetchError;
use crate::index::IndexError;
use crate::parser::ParseError;
use crate::store::{DocumentStatus, StoreError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upload-completion notification delivered once per finished upload.
///
/// The owner id has already been authenticated by the upload collaborator;
/// the orchestrator does not re-verify sessions.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadEvent {
    /// Authenticated owner of the uploaded document.
    pub owner_id: String,
    /// Key of the uploaded object in blob storage.
    pub storage_key: String,
    /// Human-readable name shown to the owner.
    pub display_name: String,
    /// Retrievable location of the uploaded payload.
    pub source_url: String,
}

/// Errors surfaced to callers of the ingestion API.
///
/// Pipeline failures never appear here: they are absorbed into a `FAILED`
/// status transition so the trigger source only ever learns that ingestion
/// was scheduled.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The upload event was malformed; no record was created.
    #[error("Invalid upload event: {0}")]
    InvalidUploadEvent(&'static str),
    /// The requested document does not exist or belongs to another owner.
    #[error("Document not found")]
    NotFound,
    /// The document record store rejected an operation.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failures raised inside the pipeline body, between fetch and upsert.
///
/// Exactly one of these (or success) decides the terminal status of every
/// ingestion run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Source payload was unreachable or incomplete.
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),
    /// Payload bytes were not an extractable document.
    #[error("Parse failed: {0}")]
    Parse(#[from] ParseError),
    /// Chunking could not segment the extracted pages.
    #[error("Chunking failed: {0}")]
    Chunking(#[from] ChunkingError),
    /// Embedding provider failed after retries were exhausted or permanently.
    #[error("Embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),
    /// Vector index rejected the namespace operation.
    #[error("Indexing failed: {0}")]
    Index(#[from] IndexError),
    /// The whole-run watchdog fired before the pipeline finished.
    #[error("Ingestion run timed out")]
    Timeout,
}

/// Outcome of one end-to-end ingestion run.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    /// Identifier of the document this run processed.
    pub document_id: String,
    /// Terminal status the document was left in.
    pub status: DocumentStatus,
    /// Number of chunks indexed; zero for failed runs.
    pub chunks_indexed: usize,
}
