//! Chunk-size heuristics and deterministic page chunking.
//!
//! Pages are split into token-budgeted chunks with `semchunk`, counting tokens
//! via `tiktoken` for the configured embedding model. Splitting is fully
//! deterministic for a given input: the same page sequence always produces
//! byte-identical chunk boundaries, which re-ingestion and the idempotent
//! upsert keying depend on.

use crate::parser::PageUnit;
use anyhow::Error as TokenizerError;
use semchunk_rs::Chunker;
use std::sync::Arc;
use thiserror::Error;
use tiktoken_rs::{CoreBPE, cl100k_base, get_bpe_from_model, model::get_context_size};

type TokenCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;

const MIN_AUTOMATIC_CHUNK_SIZE: usize = 256;
const MAX_AUTOMATIC_CHUNK_SIZE: usize = 1024;

/// Errors produced while turning page units into embeddable chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// Ingestion configured an impossible token budget.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Tokenizer resources were unavailable for the configured model.
    #[error("failed to initialize tokenizer for model '{model}': {source}")]
    Tokenizer {
        /// Embedding model we attempted to load.
        model: String,
        /// Underlying error raised by the tokenizer library.
        #[source]
        source: TokenizerError,
    },
}

/// A bounded-length unit of text ready for embedding.
///
/// Chunks never span documents; the sequence number is assigned globally in
/// page order and doubles as the idempotent upsert key within the document's
/// namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Identifier of the source document (also the index namespace).
    pub document_id: String,
    /// 0-based index of the originating page.
    pub page_index: usize,
    /// Position of this chunk within the document, in page order.
    pub seq: u64,
    /// Chunk text passed to the embedding provider.
    pub text: String,
}

/// Determine the token budget per chunk, respecting an explicit override.
///
/// Without an override the budget is derived from the embedding model's
/// context window divided by 4 and clamped into `[256, 1024]`.
pub fn determine_chunk_size(override_size: Option<usize>, model: &str) -> usize {
    if let Some(explicit) = override_size {
        return explicit.max(1);
    }

    let window = embedding_context_window(model);
    let base = (window / 4).max(1);
    base.clamp(MIN_AUTOMATIC_CHUNK_SIZE, MAX_AUTOMATIC_CHUNK_SIZE)
}

fn embedding_context_window(model: &str) -> usize {
    if model.starts_with("text-embedding-3") || model.starts_with("text-embedding-ada-002") {
        return 8192;
    }
    get_context_size(model)
}

/// Split page units into ordered, token-budgeted chunks.
///
/// Every page containing non-whitespace text contributes at least one chunk;
/// empty pages contribute none. Sequence numbers are contiguous across the
/// whole document in page order.
pub fn chunk_pages(
    document_id: &str,
    pages: &[PageUnit],
    chunk_size: usize,
    model: &str,
) -> Result<Vec<Chunk>, ChunkingError> {
    if chunk_size == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }

    let token_counter = build_token_counter(model)?;
    let mut chunks = Vec::new();
    let mut seq = 0u64;

    for page in pages {
        let text = page.text.trim();
        if text.is_empty() {
            continue;
        }

        let mut segments = split_page(text, chunk_size, &token_counter);
        if segments.is_empty() {
            // semchunk can drop degenerate inputs; keep the page visible.
            segments.push(text.to_string());
        }

        for segment in segments {
            chunks.push(Chunk {
                document_id: document_id.to_string(),
                page_index: page.page_index,
                seq,
                text: segment,
            });
            seq += 1;
        }
    }

    Ok(chunks)
}

fn split_page(text: &str, chunk_size: usize, token_counter: &TokenCounter) -> Vec<String> {
    let counter = token_counter.clone();
    let chunker = Chunker::new(
        chunk_size,
        Box::new(move |segment: &str| counter.as_ref()(segment)),
    );
    chunker.chunk(text)
}

/// Build a token counter for the given embedding model.
///
/// Uses the model's tiktoken encoding when known and falls back to
/// `cl100k_base` otherwise, so unknown model aliases still chunk
/// deterministically.
fn build_token_counter(model: &str) -> Result<TokenCounter, ChunkingError> {
    let encoding = resolve_encoding(model).map_err(|source| ChunkingError::Tokenizer {
        model: model.to_string(),
        source,
    })?;
    let encoding = Arc::new(encoding);

    Ok(Arc::new(move |segment: &str| {
        encoding.encode_ordinary(segment).len()
    }))
}

fn resolve_encoding(model: &str) -> Result<CoreBPE, TokenizerError> {
    match get_bpe_from_model(model) {
        Ok(encoding) => Ok(encoding),
        Err(model_err) => {
            tracing::debug!(
                model,
                error = %model_err,
                "Tokenizer model lookup failed; using cl100k_base"
            );
            cl100k_base()
        }
    }
}
