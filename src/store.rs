//! Durable document records and the ingestion status state machine.
//!
//! Every completed upload gets exactly one row in the `documents` table. The
//! orchestrator is the only writer: it creates the record in `PROCESSING` and
//! later moves it to exactly one terminal state. Owner id never changes after
//! creation.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by the document record store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying database operation failed.
    #[error("Document store request failed: {0}")]
    Database(#[from] sqlx::Error),
    /// A row carried a status value outside the state machine.
    #[error("Unknown document status: {0}")]
    InvalidStatus(String),
}

/// Processing status of an uploaded document.
///
/// `Pending` exists only before registration; the orchestrator creates
/// records directly in `Processing`. `Success` and `Failed` are terminal and
/// are only left through an explicit re-ingest request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentStatus {
    /// Upload acknowledged but not yet registered.
    Pending,
    /// Ingestion pipeline is running.
    Processing,
    /// Pipeline completed and chunks are indexed.
    Success,
    /// Pipeline terminated with a failure.
    Failed,
}

impl DocumentStatus {
    /// Stable string form persisted in the database.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
        }
    }

    /// Whether the status is terminal for the state machine.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

impl FromStr for DocumentStatus {
    type Err = StoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "PENDING" => Ok(Self::Pending),
            "PROCESSING" => Ok(Self::Processing),
            "SUCCESS" => Ok(Self::Success),
            "FAILED" => Ok(Self::Failed),
            other => Err(StoreError::InvalidStatus(other.to_string())),
        }
    }
}

/// Durable record of one uploaded document.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Document {
    /// Opaque unique id assigned at registration; doubles as the index namespace.
    pub id: String,
    /// Key of the uploaded object in blob storage.
    pub storage_key: String,
    /// Human-readable name shown to the owner.
    pub display_name: String,
    /// Authenticated owner; immutable after creation.
    pub owner_id: String,
    /// Retrievable location of the uploaded payload.
    pub source_url: String,
    /// Current state-machine position.
    pub status: DocumentStatus,
    /// Creation time, unix seconds.
    pub created_at: i64,
}

/// Attributes supplied when registering a new document.
#[derive(Debug, Clone)]
pub struct NewDocument {
    /// Key of the uploaded object in blob storage.
    pub storage_key: String,
    /// Human-readable name shown to the owner.
    pub display_name: String,
    /// Authenticated owner id.
    pub owner_id: String,
    /// Retrievable location of the uploaded payload.
    pub source_url: String,
}

/// SQLite-backed record store shared across ingestion runs.
pub struct DocumentStore {
    pool: SqlitePool,
}

impl DocumentStore {
    /// Open (creating if needed) the database behind `database_url` and run migrations.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(sqlx::Error::from)?
            .create_if_missing(true);
        // In-memory databases are per-connection; a wider pool would hand out
        // empty schemas.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                storage_key TEXT NOT NULL,
                display_name TEXT NOT NULL,
                owner_id TEXT NOT NULL,
                source_url TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_owner ON documents(owner_id)")
            .execute(&pool)
            .await?;

        Ok(Self { pool })
    }

    /// Atomically create a record for a completed upload in the processing state.
    pub async fn create_document(&self, new: NewDocument) -> Result<Document, StoreError> {
        let document = Document {
            id: Uuid::new_v4().to_string(),
            storage_key: new.storage_key,
            display_name: new.display_name,
            owner_id: new.owner_id,
            source_url: new.source_url,
            status: DocumentStatus::Processing,
            created_at: unix_now(),
        };

        sqlx::query(
            r#"
            INSERT INTO documents (id, storage_key, display_name, owner_id, source_url, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&document.id)
        .bind(&document.storage_key)
        .bind(&document.display_name)
        .bind(&document.owner_id)
        .bind(&document.source_url)
        .bind(document.status.as_str())
        .bind(document.created_at)
        .execute(&self.pool)
        .await?;

        tracing::info!(document_id = %document.id, owner_id = %document.owner_id, "Document registered");
        Ok(document)
    }

    /// Look up a document by id, scoped to its owner.
    pub async fn find_document(
        &self,
        id: &str,
        owner_id: &str,
    ) -> Result<Option<Document>, StoreError> {
        let row = sqlx::query(
            "SELECT id, storage_key, display_name, owner_id, source_url, status, created_at \
             FROM documents WHERE id = ? AND owner_id = ?",
        )
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(document_from_row).transpose()
    }

    /// Enumerate an owner's documents, newest first.
    pub async fn list_documents(&self, owner_id: &str) -> Result<Vec<Document>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, storage_key, display_name, owner_id, source_url, status, created_at \
             FROM documents WHERE owner_id = ? ORDER BY created_at DESC, id",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(document_from_row).collect()
    }

    /// Transition a document to a new status.
    pub async fn set_status(&self, id: &str, status: DocumentStatus) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE documents SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Database(sqlx::Error::RowNotFound));
        }

        tracing::debug!(document_id = id, status = status.as_str(), "Status updated");
        Ok(())
    }

    /// Remove a document record; returns whether a row was deleted.
    pub async fn delete_document(&self, id: &str, owner_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ? AND owner_id = ?")
            .bind(id)
            .bind(owner_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

fn document_from_row(row: sqlx::sqlite::SqliteRow) -> Result<Document, StoreError> {
    let status: String = row.get("status");
    Ok(Document {
        id: row.get("id"),
        storage_key: row.get("storage_key"),
        display_name: row.get("display_name"),
        owner_id: row.get("owner_id"),
        source_url: row.get("source_url"),
        status: status.parse()?,
        created_at: row.get("created_at"),
    })
}

fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or(0)
}
