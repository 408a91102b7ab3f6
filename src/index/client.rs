//! HTTP client wrapper for the Qdrant vector index.
//!
//! Each document gets its own namespace, realized as a Qdrant collection
//! named after the document id. Isolation between documents is therefore
//! structural: a query scoped to one namespace cannot see another document's
//! chunks. Point ids inside a namespace are chunk sequence numbers, so
//! retrying an upsert overwrites rather than duplicates.

use crate::index::types::{
    ChunkPoint, CountResponse, IndexError, QueryPoint, QueryResponse, QueryResponseResult,
    ScoredChunk,
};
use reqwest::{Client, Method, StatusCode};
use serde_json::{Value, json};
use time::OffsetDateTime;

/// Lightweight HTTP client for namespace-partitioned vector storage.
pub struct VectorIndex {
    pub(crate) client: Client,
    pub(crate) base_url: String,
    pub(crate) api_key: Option<String>,
    pub(crate) vector_size: u64,
}

impl VectorIndex {
    /// Construct a new client against the given Qdrant base URL.
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        vector_size: u64,
    ) -> Result<Self, IndexError> {
        let client = Client::builder().user_agent("docflow/0.1").build()?;
        let base_url = normalize_base_url(base_url).map_err(IndexError::InvalidUrl)?;
        tracing::debug!(url = %base_url, vector_size, "Initialized vector index client");

        Ok(Self {
            client,
            base_url,
            api_key,
            vector_size,
        })
    }

    /// Create the namespace when it is missing from the store.
    pub async fn ensure_namespace(&self, namespace: &str) -> Result<(), IndexError> {
        if self.namespace_exists(namespace).await? {
            return Ok(());
        }

        tracing::debug!(namespace, "Creating namespace");
        let body = json!({
            "vectors": {
                "size": self.vector_size,
                "distance": "Cosine"
            }
        });

        let response = self
            .request(Method::PUT, &format!("collections/{namespace}"))
            .json(&body)
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(namespace, "Namespace created");
        })
        .await
    }

    /// Upsert chunk points into the namespace, keyed by sequence number.
    ///
    /// Returns the number of points written. An empty batch is a no-op.
    pub async fn upsert_chunks(
        &self,
        namespace: &str,
        points: Vec<ChunkPoint>,
    ) -> Result<usize, IndexError> {
        if points.is_empty() {
            return Ok(0);
        }

        let now = current_timestamp_rfc3339();
        let serialized: Vec<Value> = points
            .iter()
            .map(|point| {
                json!({
                    "id": point.seq,
                    "vector": point.vector,
                    "payload": {
                        "document_id": namespace,
                        "page_index": point.page_index,
                        "seq": point.seq,
                        "text": point.text,
                        "indexed_at": now,
                    },
                })
            })
            .collect();

        let point_count = serialized.len();
        let response = self
            .request(Method::PUT, &format!("collections/{namespace}/points"))
            .query(&[("wait", true)])
            .json(&json!({ "points": serialized }))
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(namespace, points = point_count, "Chunks upserted");
        })
        .await?;

        Ok(point_count)
    }

    /// Drop every chunk stored under the namespace.
    ///
    /// A namespace that never existed is treated as already cleared, so the
    /// call is safe to make before a first ingestion.
    pub async fn clear_namespace(&self, namespace: &str) -> Result<(), IndexError> {
        let response = self
            .request(Method::DELETE, &format!("collections/{namespace}"))
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {
                tracing::debug!(namespace, "Namespace cleared");
                Ok(())
            }
            StatusCode::NOT_FOUND => Ok(()),
            status => {
                let body = response.text().await.unwrap_or_default();
                let error = IndexError::UnexpectedStatus { status, body };
                tracing::error!(namespace, error = %error, "Failed to clear namespace");
                Err(error)
            }
        }
    }

    /// Similarity query scoped to one namespace: the read-path contract.
    pub async fn query(
        &self,
        namespace: &str,
        vector: Vec<f32>,
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>, IndexError> {
        let body = json!({
            "query": vector,
            "limit": top_k,
            "with_payload": true,
        });

        let response = self
            .request(Method::POST, &format!("collections/{namespace}/points/query"))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = IndexError::UnexpectedStatus { status, body };
            tracing::error!(namespace, error = %error, "Namespace query failed");
            return Err(error);
        }

        let payload: QueryResponse = response.json().await?;
        let points = match payload.result {
            QueryResponseResult::Points(points) => points,
            QueryResponseResult::Object { points } => points,
        };

        Ok(points.into_iter().map(scored_chunk).collect())
    }

    /// Count the points currently stored under the namespace.
    pub async fn count(&self, namespace: &str) -> Result<usize, IndexError> {
        let response = self
            .request(Method::POST, &format!("collections/{namespace}/points/count"))
            .json(&json!({ "exact": true }))
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {
                let payload: CountResponse = response.json().await?;
                Ok(payload.result.count)
            }
            StatusCode::NOT_FOUND => Ok(0),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(IndexError::UnexpectedStatus { status, body })
            }
        }
    }

    async fn namespace_exists(&self, namespace: &str) -> Result<bool, IndexError> {
        let response = self
            .request(Method::GET, &format!("collections/{namespace}"))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                let body = response.text().await.unwrap_or_default();
                let error = IndexError::UnexpectedStatus { status, body };
                tracing::error!(namespace, error = %error, "Namespace existence check failed");
                Err(error)
            }
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format_endpoint(&self.base_url, path);
        let mut req = self.client.request(method, url);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            req = req.header("api-key", api_key);
        }
        req
    }

    async fn ensure_success<F>(
        &self,
        response: reqwest::Response,
        on_success: F,
    ) -> Result<(), IndexError>
    where
        F: FnOnce(),
    {
        if response.status().is_success() {
            on_success();
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = IndexError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Vector index request failed");
            Err(error)
        }
    }
}

fn scored_chunk(point: QueryPoint) -> ScoredChunk {
    let seq = match &point.id {
        Value::Number(number) => number.as_u64().unwrap_or_default(),
        other => other.as_u64().unwrap_or_default(),
    };
    ScoredChunk {
        seq,
        score: point.score,
        payload: point.payload,
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::DELETE, Method::GET, Method::POST, Method::PUT, MockServer};

    fn index_for(server: &MockServer) -> VectorIndex {
        VectorIndex::new(&server.base_url(), None, 2).expect("index client")
    }

    fn chunk_point(seq: u64, text: &str) -> ChunkPoint {
        ChunkPoint {
            seq,
            page_index: 0,
            text: text.to_string(),
            vector: vec![0.1, 0.2],
        }
    }

    #[tokio::test]
    async fn upsert_uses_sequence_numbers_as_point_ids() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/collections/doc-1/points")
                    .query_param("wait", "true")
                    .json_body_partial(
                        r#"{
                            "points": [
                                { "id": 0 },
                                { "id": 1 }
                            ]
                        }"#,
                    );
                then.status(200).json_body(serde_json::json!({
                    "status": "ok", "time": 0.0, "result": { "status": "completed" }
                }));
            })
            .await;

        let index = index_for(&server);
        let written = index
            .upsert_chunks(
                "doc-1",
                vec![chunk_point(0, "first"), chunk_point(1, "second")],
            )
            .await
            .expect("upsert");

        mock.assert();
        assert_eq!(written, 2);
    }

    #[tokio::test]
    async fn ensure_namespace_skips_creation_when_present() {
        let server = MockServer::start_async().await;
        let exists = server
            .mock_async(|when, then| {
                when.method(GET).path("/collections/doc-1");
                then.status(200).json_body(serde_json::json!({
                    "status": "ok", "time": 0.0, "result": {}
                }));
            })
            .await;
        let create = server
            .mock_async(|when, then| {
                when.method(PUT).path("/collections/doc-1");
                then.status(200);
            })
            .await;

        let index = index_for(&server);
        index.ensure_namespace("doc-1").await.expect("ensure");

        exists.assert();
        create.assert_hits(0);
    }

    #[tokio::test]
    async fn clear_namespace_tolerates_missing_namespace() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(DELETE).path("/collections/doc-unknown");
                then.status(404);
            })
            .await;

        let index = index_for(&server);
        index
            .clear_namespace("doc-unknown")
            .await
            .expect("missing namespace is already cleared");
    }

    #[tokio::test]
    async fn query_returns_scored_chunks_with_payload() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/collections/doc-1/points/query");
                then.status(200).json_body(serde_json::json!({
                    "status": "ok",
                    "time": 0.0,
                    "result": [
                        {
                            "id": 3,
                            "score": 0.91,
                            "payload": {
                                "document_id": "doc-1",
                                "page_index": 1,
                                "text": "chunk text"
                            }
                        }
                    ]
                }));
            })
            .await;

        let index = index_for(&server);
        let hits = index
            .query("doc-1", vec![0.1, 0.2], 5)
            .await
            .expect("query");

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].seq, 3);
        let payload = hits[0].payload.as_ref().expect("payload");
        assert_eq!(payload["document_id"], "doc-1");
    }

    #[tokio::test]
    async fn upsert_failure_surfaces_status_and_body() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(PUT).path("/collections/doc-1/points");
                then.status(503).body("overloaded");
            })
            .await;

        let index = index_for(&server);
        let error = index
            .upsert_chunks("doc-1", vec![chunk_point(0, "text")])
            .await
            .unwrap_err();

        assert!(error.is_transient());
        assert!(matches!(
            error,
            IndexError::UnexpectedStatus {
                status: StatusCode::SERVICE_UNAVAILABLE,
                ..
            }
        ));
    }
}
