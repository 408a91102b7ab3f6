#![deny(missing_docs)]

//! Core library for the docflow document ingestion service.

/// HTTP routing and REST handlers.
pub mod api;
/// Token-aware semantic chunking of extracted pages.
pub mod chunking;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Source payload retrieval from blob storage.
pub mod fetch;
/// Qdrant-backed vector index with per-document namespaces.
pub mod index;
/// Ingestion orchestration and the document state machine.
pub mod ingest;
/// Structured logging and tracing setup.
pub mod logging;
/// Ingestion metrics helpers.
pub mod metrics;
/// PDF text extraction into page units.
pub mod parser;
/// Durable document records.
pub mod store;
