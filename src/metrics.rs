use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing ingestion activity.
#[derive(Default)]
pub struct IngestMetrics {
    documents_succeeded: AtomicU64,
    documents_failed: AtomicU64,
    chunks_indexed: AtomicU64,
}

impl IngestMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successfully ingested document and the number of chunks indexed for it.
    pub fn record_success(&self, chunk_count: u64) {
        self.documents_succeeded.fetch_add(1, Ordering::Relaxed);
        self.chunks_indexed.fetch_add(chunk_count, Ordering::Relaxed);
    }

    /// Record an ingestion run that terminated in the failed state.
    pub fn record_failure(&self) {
        self.documents_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_succeeded: self.documents_succeeded.load(Ordering::Relaxed),
            documents_failed: self.documents_failed.load(Ordering::Relaxed),
            chunks_indexed: self.chunks_indexed.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of ingestion counters used for reporting.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Number of documents that reached the success state since startup.
    pub documents_succeeded: u64,
    /// Number of documents that reached the failed state since startup.
    pub documents_failed: u64,
    /// Total chunk count indexed across all successful documents.
    pub chunks_indexed: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_successes_and_chunks() {
        let metrics = IngestMetrics::new();
        metrics.record_success(3);
        metrics.record_success(5);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.documents_succeeded, 2);
        assert_eq!(snapshot.chunks_indexed, 8);
        assert_eq!(snapshot.documents_failed, 0);
    }

    #[test]
    fn failures_do_not_touch_chunk_counter() {
        let metrics = IngestMetrics::new();
        metrics.record_failure();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.documents_failed, 1);
        assert_eq!(snapshot.chunks_indexed, 0);
    }
}
