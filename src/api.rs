//! HTTP surface for the docflow ingestion service.
//!
//! This module exposes a compact Axum router with a handful of endpoints:
//!
//! - `POST /uploads/complete` – Register a finished upload and schedule its
//!   ingestion run. Replies `202 Accepted` with the new document id before the
//!   pipeline finishes; progress is observed through the document status.
//! - `GET /documents` – List the calling owner's documents, newest first.
//! - `GET /documents/{id}` – Fetch one document record, owner-scoped.
//! - `POST /documents/{id}/reingest` – Clear the document's indexed chunks and
//!   run the pipeline again; replies with the run report once it finishes.
//! - `DELETE /documents/{id}` – Remove the record and its indexed chunks.
//! - `GET /metrics` – Observe ingestion counters.
//!
//! Owner identity arrives pre-authenticated from the upload collaborator; the
//! handlers only scope queries by it and never verify sessions themselves.

use crate::ingest::{IngestApi, IngestError, UploadEvent};
use crate::store::Document;
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Build the HTTP router exposing the ingestion API surface.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: IngestApi + 'static,
{
    Router::new()
        .route("/uploads/complete", post(complete_upload::<S>))
        .route("/documents", get(list_documents::<S>))
        .route(
            "/documents/:id",
            get(get_document::<S>).delete(delete_document::<S>),
        )
        .route("/documents/:id/reingest", post(reingest_document::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .with_state(service)
}

/// Owner scope carried on every document query.
#[derive(Deserialize)]
struct OwnerQuery {
    owner_id: String,
}

/// Acknowledgement body for `POST /uploads/complete`.
#[derive(Serialize)]
struct UploadAccepted {
    /// Identifier of the registered document.
    document_id: String,
    /// Status at acknowledgement time, always `PROCESSING`.
    status: crate::store::DocumentStatus,
}

/// Register an upload-completion event and schedule ingestion.
///
/// The document record is created before this handler replies, so the caller
/// can immediately poll `GET /documents/{id}`. The pipeline itself runs on a
/// detached task and reports only through the record's status.
async fn complete_upload<S>(
    State(service): State<Arc<S>>,
    Json(event): Json<UploadEvent>,
) -> Result<(StatusCode, Json<UploadAccepted>), AppError>
where
    S: IngestApi + 'static,
{
    let document = service.register(event).await?;
    let accepted = UploadAccepted {
        document_id: document.id.clone(),
        status: document.status,
    };
    tracing::info!(document_id = %document.id, "Upload acknowledged; ingestion scheduled");

    let worker = Arc::clone(&service);
    tokio::spawn(async move {
        worker.process(document).await;
    });

    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

/// Response body for `GET /documents`.
#[derive(Serialize)]
struct DocumentsResponse {
    documents: Vec<Document>,
}

/// List the owner's documents, newest first.
async fn list_documents<S>(
    State(service): State<Arc<S>>,
    Query(scope): Query<OwnerQuery>,
) -> Result<Json<DocumentsResponse>, AppError>
where
    S: IngestApi,
{
    let documents = service.list_documents(&scope.owner_id).await?;
    Ok(Json(DocumentsResponse { documents }))
}

/// Fetch one document record, scoped to its owner.
async fn get_document<S>(
    State(service): State<Arc<S>>,
    Path(id): Path<String>,
    Query(scope): Query<OwnerQuery>,
) -> Result<Json<Document>, AppError>
where
    S: IngestApi,
{
    let document = service
        .find_document(&id, &scope.owner_id)
        .await?
        .ok_or(IngestError::NotFound)?;
    Ok(Json(document))
}

/// Re-run the ingestion pipeline for an existing document.
///
/// Previously indexed chunks are cleared before the new run writes, so a
/// successful reply never reflects a mix of old and new content.
async fn reingest_document<S>(
    State(service): State<Arc<S>>,
    Path(id): Path<String>,
    Query(scope): Query<OwnerQuery>,
) -> Result<Json<crate::ingest::IngestReport>, AppError>
where
    S: IngestApi,
{
    let report = service.reingest(&id, &scope.owner_id).await?;
    Ok(Json(report))
}

/// Remove a document record and its indexed chunks.
async fn delete_document<S>(
    State(service): State<Arc<S>>,
    Path(id): Path<String>,
    Query(scope): Query<OwnerQuery>,
) -> Result<StatusCode, AppError>
where
    S: IngestApi,
{
    if service.delete_document(&id, &scope.owner_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError(IngestError::NotFound))
    }
}

/// Return the ingestion counters.
async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<crate::metrics::MetricsSnapshot>
where
    S: IngestApi,
{
    Json(service.metrics_snapshot())
}

struct AppError(IngestError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            IngestError::InvalidUploadEvent(_) => StatusCode::BAD_REQUEST,
            IngestError::NotFound => StatusCode::NOT_FOUND,
            IngestError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.0.to_string()).into_response()
    }
}

impl From<IngestError> for AppError {
    fn from(inner: IngestError) -> Self {
        Self(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::create_router;
    use crate::ingest::{IngestApi, IngestError, IngestReport, UploadEvent};
    use crate::metrics::MetricsSnapshot;
    use crate::store::{Document, DocumentStatus};
    use async_trait::async_trait;
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode},
    };
    use serde_json::json;
    use std::sync::Arc;
    use tokio::sync::{Mutex, Notify};
    use tower::ServiceExt;

    fn document(id: &str, owner: &str, status: DocumentStatus) -> Document {
        Document {
            id: id.into(),
            storage_key: "uploads/report.pdf".into(),
            display_name: "report.pdf".into(),
            owner_id: owner.into(),
            source_url: "https://blobs.example/uploads/report.pdf".into(),
            status,
            created_at: 1_700_000_000,
        }
    }

    struct StubIngestService {
        documents: Mutex<Vec<Document>>,
        processed: Mutex<Vec<String>>,
        reingested: Mutex<Vec<(String, String)>>,
        process_started: Notify,
    }

    impl StubIngestService {
        fn new(documents: Vec<Document>) -> Self {
            Self {
                documents: Mutex::new(documents),
                processed: Mutex::new(Vec::new()),
                reingested: Mutex::new(Vec::new()),
                process_started: Notify::new(),
            }
        }
    }

    #[async_trait]
    impl IngestApi for StubIngestService {
        async fn register(&self, event: UploadEvent) -> Result<Document, IngestError> {
            if event.owner_id.trim().is_empty() {
                return Err(IngestError::InvalidUploadEvent("owner id is required"));
            }
            let doc = document("doc-new", &event.owner_id, DocumentStatus::Processing);
            self.documents.lock().await.push(doc.clone());
            Ok(doc)
        }

        async fn process(&self, document: Document) -> IngestReport {
            self.processed.lock().await.push(document.id.clone());
            self.process_started.notify_one();
            IngestReport {
                document_id: document.id,
                status: DocumentStatus::Success,
                chunks_indexed: 3,
            }
        }

        async fn reingest(&self, id: &str, owner_id: &str) -> Result<IngestReport, IngestError> {
            let known = self
                .documents
                .lock()
                .await
                .iter()
                .any(|doc| doc.id == id && doc.owner_id == owner_id);
            if !known {
                return Err(IngestError::NotFound);
            }
            self.reingested
                .lock()
                .await
                .push((id.to_string(), owner_id.to_string()));
            Ok(IngestReport {
                document_id: id.to_string(),
                status: DocumentStatus::Success,
                chunks_indexed: 5,
            })
        }

        async fn find_document(
            &self,
            id: &str,
            owner_id: &str,
        ) -> Result<Option<Document>, IngestError> {
            Ok(self
                .documents
                .lock()
                .await
                .iter()
                .find(|doc| doc.id == id && doc.owner_id == owner_id)
                .cloned())
        }

        async fn list_documents(&self, owner_id: &str) -> Result<Vec<Document>, IngestError> {
            Ok(self
                .documents
                .lock()
                .await
                .iter()
                .filter(|doc| doc.owner_id == owner_id)
                .cloned()
                .collect())
        }

        async fn delete_document(&self, id: &str, owner_id: &str) -> Result<bool, IngestError> {
            let mut docs = self.documents.lock().await;
            let before = docs.len();
            docs.retain(|doc| !(doc.id == id && doc.owner_id == owner_id));
            Ok(docs.len() < before)
        }

        fn metrics_snapshot(&self) -> MetricsSnapshot {
            MetricsSnapshot {
                documents_succeeded: 4,
                documents_failed: 1,
                chunks_indexed: 42,
            }
        }
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn upload_completion_is_acknowledged_before_processing_finishes() {
        let service = Arc::new(StubIngestService::new(vec![]));
        let app = create_router(service.clone());

        let payload = json!({
            "owner_id": "user-1",
            "storage_key": "uploads/report.pdf",
            "display_name": "report.pdf",
            "source_url": "https://blobs.example/uploads/report.pdf"
        });

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/uploads/complete")
                    .header("content-type", "application/json")
                    .body(Body::from(payload.to_string()))
                    .expect("request"),
            )
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let json = body_json(response).await;
        assert_eq!(json["document_id"], "doc-new");
        assert_eq!(json["status"], "PROCESSING");

        // The pipeline runs on a detached task; wait for it to start.
        service.process_started.notified().await;
        let processed = service.processed.lock().await;
        assert_eq!(processed.as_slice(), ["doc-new"]);
    }

    #[tokio::test]
    async fn invalid_upload_event_is_rejected_with_bad_request() {
        let service = Arc::new(StubIngestService::new(vec![]));
        let app = create_router(service.clone());

        let payload = json!({
            "owner_id": "   ",
            "storage_key": "uploads/report.pdf",
            "display_name": "report.pdf",
            "source_url": "https://blobs.example/uploads/report.pdf"
        });

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/uploads/complete")
                    .header("content-type", "application/json")
                    .body(Body::from(payload.to_string()))
                    .expect("request"),
            )
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(service.processed.lock().await.is_empty());
    }

    #[tokio::test]
    async fn document_lookup_is_owner_scoped() {
        let service = Arc::new(StubIngestService::new(vec![document(
            "doc-1",
            "user-1",
            DocumentStatus::Success,
        )]));
        let app = create_router(service.clone());

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/documents/doc-1?owner_id=user-1")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["id"], "doc-1");
        assert_eq!(json["status"], "SUCCESS");

        let foreign = app
            .oneshot(
                Request::builder()
                    .uri("/documents/doc-1?owner_id=user-2")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");
        assert_eq!(foreign.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn listing_returns_only_the_owners_documents() {
        let service = Arc::new(StubIngestService::new(vec![
            document("doc-1", "user-1", DocumentStatus::Success),
            document("doc-2", "user-2", DocumentStatus::Failed),
        ]));
        let app = create_router(service);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/documents?owner_id=user-1")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        let documents = json["documents"].as_array().expect("documents array");
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0]["id"], "doc-1");
    }

    #[tokio::test]
    async fn reingest_replies_with_the_run_report() {
        let service = Arc::new(StubIngestService::new(vec![document(
            "doc-1",
            "user-1",
            DocumentStatus::Failed,
        )]));
        let app = create_router(service.clone());

        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/documents/doc-1/reingest?owner_id=user-1")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["document_id"], "doc-1");
        assert_eq!(json["status"], "SUCCESS");
        assert_eq!(json["chunks_indexed"], 5);

        let reingested = service.reingested.lock().await;
        assert_eq!(reingested.len(), 1);
        assert_eq!(reingested[0].0, "doc-1");
        assert_eq!(reingested[0].1, "user-1");
    }

    #[tokio::test]
    async fn delete_returns_no_content_then_not_found() {
        let service = Arc::new(StubIngestService::new(vec![document(
            "doc-1",
            "user-1",
            DocumentStatus::Success,
        )]));
        let app = create_router(service);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::DELETE)
                    .uri("/documents/doc-1?owner_id=user-1")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let again = app
            .oneshot(
                Request::builder()
                    .method(Method::DELETE)
                    .uri("/documents/doc-1?owner_id=user-1")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");
        assert_eq!(again.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn metrics_report_ingestion_counters() {
        let service = Arc::new(StubIngestService::new(vec![]));
        let app = create_router(service);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["documents_succeeded"], 4);
        assert_eq!(json["documents_failed"], 1);
        assert_eq!(json["chunks_indexed"], 42);
    }
}
