//! Qdrant-backed vector index, partitioned into per-document namespaces.

pub mod client;
pub mod types;

pub use client::VectorIndex;
pub use types::{ChunkPoint, IndexError, ScoredChunk};
