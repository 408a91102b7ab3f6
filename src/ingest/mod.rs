//! Ingestion orchestration: registration, the pipeline state machine, retry
//! policy, and the error taxonomy.

pub mod retry;
mod service;
pub mod types;

pub use retry::RetryPolicy;
pub use service::{IngestApi, IngestConfig, IngestService};
pub use types::{IngestError, IngestReport, PipelineError, UploadEvent};
