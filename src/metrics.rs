//! Process-local counters for ingestion and retrieval.

use crate::model::{IngestReport, IngestStatus, SourceTier};
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing ingestion activity.
#[derive(Debug, Default)]
pub struct IngestMetrics {
    documents_created: AtomicU64,
    documents_partial: AtomicU64,
    documents_unindexed: AtomicU64,
    duplicates_rejected: AtomicU64,
    chunks_indexed: AtomicU64,
    chunks_failed: AtomicU64,
}

impl IngestMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of one ingestion.
    pub fn record(&self, report: &IngestReport) {
        match report.status {
            IngestStatus::Duplicate => {
                self.duplicates_rejected.fetch_add(1, Ordering::Relaxed);
                return;
            }
            IngestStatus::Created => {
                self.documents_created.fetch_add(1, Ordering::Relaxed);
            }
            IngestStatus::Partial => {
                self.documents_partial.fetch_add(1, Ordering::Relaxed);
                if report.unindexed {
                    self.documents_unindexed.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
        self.chunks_indexed
            .fetch_add(report.indexed_chunk_count as u64, Ordering::Relaxed);
        self.chunks_failed
            .fetch_add(report.warning_count() as u64, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> IngestMetricsSnapshot {
        IngestMetricsSnapshot {
            documents_created: self.documents_created.load(Ordering::Relaxed),
            documents_partial: self.documents_partial.load(Ordering::Relaxed),
            documents_unindexed: self.documents_unindexed.load(Ordering::Relaxed),
            duplicates_rejected: self.duplicates_rejected.load(Ordering::Relaxed),
            chunks_indexed: self.chunks_indexed.load(Ordering::Relaxed),
            chunks_failed: self.chunks_failed.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of ingestion counters used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct IngestMetricsSnapshot {
    /// Documents fully indexed (including empty documents).
    pub documents_created: u64,
    /// Documents where at least one chunk failed to index.
    pub documents_partial: u64,
    /// Partial documents where no chunk could be indexed.
    pub documents_unindexed: u64,
    /// Ingestions refused as exact duplicates.
    pub duplicates_rejected: u64,
    /// Chunks written to both indexes.
    pub chunks_indexed: u64,
    /// Chunks skipped after embedding or index failures.
    pub chunks_failed: u64,
}

/// Thread-safe counters describing which tier answered queries.
#[derive(Debug, Default)]
pub struct RetrievalMetrics {
    vector_hits: AtomicU64,
    text_hits: AtomicU64,
    live_hits: AtomicU64,
    exhausted: AtomicU64,
    failed: AtomicU64,
}

impl RetrievalMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a query answered by `tier`, or exhausted when `None`.
    pub fn record_answer(&self, tier: Option<SourceTier>) {
        let counter = match tier {
            Some(SourceTier::Vector) => &self.vector_hits,
            Some(SourceTier::Text) => &self.text_hits,
            Some(SourceTier::Live) => &self.live_hits,
            None => &self.exhausted,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a query that ended in a live-scan error.
    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> RetrievalMetricsSnapshot {
        RetrievalMetricsSnapshot {
            vector_hits: self.vector_hits.load(Ordering::Relaxed),
            text_hits: self.text_hits.load(Ordering::Relaxed),
            live_hits: self.live_hits.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of retrieval counters used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct RetrievalMetricsSnapshot {
    /// Queries answered by the vector tier.
    pub vector_hits: u64,
    /// Queries answered by the text tier.
    pub text_hits: u64,
    /// Queries answered by the live scan.
    pub live_hits: u64,
    /// Queries where every tier came back empty.
    pub exhausted: u64,
    /// Queries that ended in an error.
    pub failed: u64,
}
