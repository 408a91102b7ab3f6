//! Ingestion orchestrator coordinating fetch, parse, chunk, embed, and index.

use crate::chunking;
use crate::embedding::{EmbeddingClient, EmbeddingError};
use crate::fetch::SourceFetcher;
use crate::index::{ChunkPoint, IndexError, VectorIndex};
use crate::ingest::retry::{RetryPolicy, with_backoff};
use crate::ingest::types::{IngestError, IngestReport, PipelineError, UploadEvent};
use crate::metrics::{IngestMetrics, MetricsSnapshot};
use crate::parser;
use crate::store::{Document, DocumentStatus, DocumentStore, NewDocument};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Tunables for the orchestrator, fixed at construction.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Token budget per chunk.
    pub chunk_size: usize,
    /// Embedding model used for tokenizer selection.
    pub embedding_model: String,
    /// Retry budget for transient embedding/index failures.
    pub retry: RetryPolicy,
    /// Watchdog timeout for one end-to-end run.
    pub timeout: Duration,
}

/// Abstraction over the ingestion pipeline used by the HTTP surface.
#[async_trait]
pub trait IngestApi: Send + Sync {
    /// Validate an upload event and create its document record in `PROCESSING`.
    async fn register(&self, event: UploadEvent) -> Result<Document, IngestError>;

    /// Run the pipeline for a registered document and finalize its status.
    async fn process(&self, document: Document) -> IngestReport;

    /// Explicitly re-ingest a document, clearing its namespace first.
    async fn reingest(&self, id: &str, owner_id: &str) -> Result<IngestReport, IngestError>;

    /// Look up a document record scoped to its owner.
    async fn find_document(&self, id: &str, owner_id: &str)
    -> Result<Option<Document>, IngestError>;

    /// Enumerate an owner's documents, newest first.
    async fn list_documents(&self, owner_id: &str) -> Result<Vec<Document>, IngestError>;

    /// Remove a document record and its indexed chunks.
    async fn delete_document(&self, id: &str, owner_id: &str) -> Result<bool, IngestError>;

    /// Retrieve the current ingestion counters.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

/// Drives each uploaded document through the ingestion state machine.
///
/// The service owns long-lived handles to the record store, the source
/// fetcher, the embedding client, and the vector index. Construct it once
/// near process start and share it through an `Arc`; each ingestion run is an
/// independent task with no shared mutable state beyond those external
/// services.
pub struct IngestService {
    store: DocumentStore,
    fetcher: SourceFetcher,
    embedder: Box<dyn EmbeddingClient>,
    index: VectorIndex,
    config: IngestConfig,
    metrics: Arc<IngestMetrics>,
    // Per-document guards serializing clear/replace for the same namespace.
    inflight: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl IngestService {
    /// Assemble the orchestrator from explicitly constructed adapters.
    pub fn new(
        store: DocumentStore,
        fetcher: SourceFetcher,
        embedder: Box<dyn EmbeddingClient>,
        index: VectorIndex,
        config: IngestConfig,
    ) -> Self {
        Self {
            store,
            fetcher,
            embedder,
            index,
            config,
            metrics: Arc::new(IngestMetrics::new()),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Register and process an upload event in one call.
    pub async fn ingest(&self, event: UploadEvent) -> Result<IngestReport, IngestError> {
        let document = self.register(event).await?;
        Ok(self.process_document(&document, false).await)
    }

    async fn process_document(&self, document: &Document, clear_first: bool) -> IngestReport {
        let guard = self.lock_for(&document.id);
        let held = guard.lock().await;

        let body = self.run_pipeline(document, clear_first);
        let outcome = match tokio::time::timeout(self.config.timeout, body).await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::Timeout),
        };

        // The only place terminal statuses are written: every run, whatever
        // its failure site, passes through exactly one arm here.
        let (status, chunks_indexed) = match outcome {
            Ok(chunks) => {
                self.metrics.record_success(chunks as u64);
                tracing::info!(document_id = %document.id, chunks, "Ingestion succeeded");
                (DocumentStatus::Success, chunks)
            }
            Err(error) => {
                self.metrics.record_failure();
                tracing::error!(document_id = %document.id, error = %error, "Ingestion failed");
                (DocumentStatus::Failed, 0)
            }
        };

        if let Err(error) = self.store.set_status(&document.id, status).await {
            tracing::error!(
                document_id = %document.id,
                error = %error,
                "Failed to finalize document status"
            );
        }

        let report = IngestReport {
            document_id: document.id.clone(),
            status,
            chunks_indexed,
        };

        drop(held);
        drop(guard);
        self.evict_idle_lock(&document.id);
        report
    }

    async fn run_pipeline(
        &self,
        document: &Document,
        clear_first: bool,
    ) -> Result<usize, PipelineError> {
        if clear_first {
            self.index.clear_namespace(&document.id).await?;
        }

        let bytes = self.fetcher.fetch(&document.source_url).await?;
        let pages = parser::parse_document(&bytes, parser::MIME_PDF)?;
        tracing::debug!(document_id = %document.id, pages = pages.len(), "Pages extracted");

        let chunks = chunking::chunk_pages(
            &document.id,
            &pages,
            self.config.chunk_size,
            &self.config.embedding_model,
        )?;

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let embeddings = with_backoff(
            &self.config.retry,
            "embed",
            |error: &EmbeddingError| error.is_transient(),
            || self.embedder.embed(texts.clone()),
        )
        .await?;

        // The OpenAI adapter validates its own counts, but alternative
        // implementations of the trait must not slip truncated batches past
        // the zip below.
        if embeddings.len() != chunks.len() {
            return Err(PipelineError::Embedding(EmbeddingError::MalformedResponse(
                format!(
                    "expected {} vectors, provider returned {}",
                    chunks.len(),
                    embeddings.len()
                ),
            )));
        }

        let points: Vec<ChunkPoint> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, vector)| ChunkPoint {
                seq: chunk.seq,
                page_index: chunk.page_index,
                text: chunk.text,
                vector,
            })
            .collect();

        let written = with_backoff(
            &self.config.retry,
            "upsert",
            |error: &IndexError| error.is_transient(),
            || {
                let points = points.clone();
                async move {
                    self.index.ensure_namespace(&document.id).await?;
                    self.index.upsert_chunks(&document.id, points).await
                }
            },
        )
        .await?;

        Ok(written)
    }

    fn lock_for(&self, id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self.inflight.lock().expect("inflight lock map poisoned");
        map.entry(id.to_string()).or_default().clone()
    }

    /// Drop a document's lock entry once nothing holds it.
    ///
    /// `lock_for` clones entries only while holding the map lock, so a strong
    /// count of one here means the map owns the sole reference and the entry
    /// can go; the map stays bounded by in-flight runs instead of growing
    /// with every document ever seen.
    fn evict_idle_lock(&self, id: &str) {
        let mut map = self.inflight.lock().expect("inflight lock map poisoned");
        if map
            .get(id)
            .is_some_and(|entry| Arc::strong_count(entry) == 1)
        {
            map.remove(id);
        }
    }
}

#[async_trait]
impl IngestApi for IngestService {
    async fn register(&self, event: UploadEvent) -> Result<Document, IngestError> {
        if event.owner_id.trim().is_empty() {
            return Err(IngestError::InvalidUploadEvent("owner id is required"));
        }
        if event.storage_key.trim().is_empty() {
            return Err(IngestError::InvalidUploadEvent("storage key is required"));
        }

        let document = self
            .store
            .create_document(NewDocument {
                storage_key: event.storage_key,
                display_name: event.display_name,
                owner_id: event.owner_id,
                source_url: event.source_url,
            })
            .await?;
        Ok(document)
    }

    async fn process(&self, document: Document) -> IngestReport {
        self.process_document(&document, false).await
    }

    async fn reingest(&self, id: &str, owner_id: &str) -> Result<IngestReport, IngestError> {
        let document = self
            .store
            .find_document(id, owner_id)
            .await?
            .ok_or(IngestError::NotFound)?;

        self.store
            .set_status(&document.id, DocumentStatus::Processing)
            .await?;
        tracing::info!(document_id = %document.id, "Re-ingesting document");

        Ok(self.process_document(&document, true).await)
    }

    async fn find_document(
        &self,
        id: &str,
        owner_id: &str,
    ) -> Result<Option<Document>, IngestError> {
        Ok(self.store.find_document(id, owner_id).await?)
    }

    async fn list_documents(&self, owner_id: &str) -> Result<Vec<Document>, IngestError> {
        Ok(self.store.list_documents(owner_id).await?)
    }

    async fn delete_document(&self, id: &str, owner_id: &str) -> Result<bool, IngestError> {
        let deleted = self.store.delete_document(id, owner_id).await?;
        if deleted {
            let guard = self.lock_for(id);
            let held = guard.lock().await;
            if let Err(error) = self.index.clear_namespace(id).await {
                tracing::warn!(document_id = id, error = %error, "Failed to clear namespace on delete");
            }
            drop(held);
            drop(guard);
            self.evict_idle_lock(id);
        }
        Ok(deleted)
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}
