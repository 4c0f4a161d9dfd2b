//! Document ingestion: dedup, persist, chunk, embed, index.
//!
//! Per-chunk failures never abort a document. A chunk counts as indexed only when its
//! embedding succeeded and both index writes landed (writes are retried with backoff). The
//! source text is stored before any chunk is processed, so a document whose chunks all
//! failed is still reachable through the live scan.

use crate::chunking::Chunker;
use crate::dedup::{DedupReport, Deduplicator};
use crate::embedding::EmbeddingClient;
use crate::metrics::IngestMetrics;
use crate::model::{
    Chunk, ChunkMetadata, Document, IndexEntry, IndexState, IngestReport, IngestStatus, TextEntry,
};
use crate::retry::RetryPolicy;
use crate::store::{CorpusError, DocumentStoreError, Stores};
use futures_util::{StreamExt, stream};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

/// Tunables for [`IndexingPipeline`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineSettings {
    /// Deadline for one chunk's embedding call.
    pub embed_timeout: Duration,
    /// Chunks embedded and indexed concurrently per document.
    pub embed_concurrency: usize,
    /// Retry policy for each index write.
    pub write_retry: RetryPolicy,
    /// Minimum filename similarity reported as a near-duplicate.
    pub filename_similarity_threshold: f64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            embed_timeout: Duration::from_secs(30),
            embed_concurrency: 4,
            write_retry: RetryPolicy::default(),
            filename_similarity_threshold: crate::dedup::DEFAULT_FILENAME_SIMILARITY_THRESHOLD,
        }
    }
}

/// Failures that abort an ingestion. Duplicates are reported as [`IngestStatus::Duplicate`].
#[derive(Debug, Error)]
pub enum IngestError {
    /// The request itself is unusable.
    #[error("invalid ingestion request: {0}")]
    InvalidInput(String),
    /// Document records could not be read or written.
    #[error(transparent)]
    Store(#[from] DocumentStoreError),
    /// The source text could not be stored.
    #[error(transparent)]
    Corpus(#[from] CorpusError),
}

/// One document to ingest.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    /// Owner scope.
    pub owner_id: String,
    /// Extracted text.
    pub text: String,
    /// Filename as uploaded.
    pub filename: String,
    /// MIME type reported by the upload layer.
    pub mime_type: String,
    /// Name shown in results; derived from the filename when absent.
    pub display_name: Option<String>,
    /// Extra metadata carried on the document and every chunk.
    pub metadata: Map<String, Value>,
}

impl IngestRequest {
    /// Request with no display name override and empty metadata.
    pub fn new(
        owner_id: impl Into<String>,
        text: impl Into<String>,
        filename: impl Into<String>,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            text: text.into(),
            filename: filename.into(),
            mime_type: mime_type.into(),
            display_name: None,
            metadata: Map::new(),
        }
    }

    /// Override the display name.
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    /// Attach metadata.
    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Final path component of an uploaded filename.
fn display_name_for(filename: &str) -> String {
    filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename)
        .trim()
        .to_string()
}

/// Ingestion orchestrator.
pub struct IndexingPipeline {
    stores: Stores,
    embedder: Arc<dyn EmbeddingClient>,
    chunker: Chunker,
    deduplicator: Deduplicator,
    settings: PipelineSettings,
    metrics: Arc<IngestMetrics>,
}

impl IndexingPipeline {
    /// Wire a pipeline over `stores`.
    pub fn new(
        stores: Stores,
        embedder: Arc<dyn EmbeddingClient>,
        chunker: Chunker,
        settings: PipelineSettings,
    ) -> Self {
        let deduplicator = Deduplicator::new(
            stores.documents.clone(),
            settings.filename_similarity_threshold,
        );
        Self {
            stores,
            embedder,
            chunker,
            deduplicator,
            settings,
            metrics: Arc::new(IngestMetrics::new()),
        }
    }

    /// Share an existing metrics accumulator.
    pub fn with_metrics(mut self, metrics: Arc<IngestMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Counters for this pipeline.
    pub fn metrics(&self) -> &Arc<IngestMetrics> {
        &self.metrics
    }

    /// Dedup decision for a prospective upload without writing anything.
    pub async fn check(
        &self,
        owner_id: &str,
        text: &str,
        filename: &str,
    ) -> Result<DedupReport, IngestError> {
        Ok(self.deduplicator.check(owner_id, text, filename).await?)
    }

    /// Ingest `text` for `owner_id`.
    pub async fn ingest(
        &self,
        owner_id: &str,
        text: &str,
        filename: &str,
        mime_type: &str,
    ) -> Result<IngestReport, IngestError> {
        self.ingest_request(IngestRequest::new(owner_id, text, filename, mime_type))
            .await
    }

    /// Ingest a fully specified request.
    pub async fn ingest_request(&self, request: IngestRequest) -> Result<IngestReport, IngestError> {
        if request.owner_id.trim().is_empty() {
            return Err(IngestError::InvalidInput("owner id must not be empty".into()));
        }
        if request.filename.trim().is_empty() {
            return Err(IngestError::InvalidInput("filename must not be empty".into()));
        }

        let dedup = self
            .deduplicator
            .check(&request.owner_id, &request.text, &request.filename)
            .await?;
        if let Some(existing) = dedup.exact_duplicate {
            return Ok(self.duplicate(existing));
        }

        let document = Document {
            id: Uuid::new_v4().to_string(),
            owner_id: request.owner_id.clone(),
            display_name: request
                .display_name
                .clone()
                .unwrap_or_else(|| display_name_for(&request.filename)),
            original_name: request.filename.clone(),
            mime_type: request.mime_type.clone(),
            byte_size: request.text.len() as u64,
            content_hash: dedup.content_hash,
            name_hash: dedup.name_hash,
            created_at: OffsetDateTime::now_utc(),
            index_state: IndexState::Pending,
            metadata: request.metadata.clone(),
        };

        let mut document = match self.stores.documents.insert(&document).await {
            Ok(document) => document,
            Err(DocumentStoreError::Duplicate { existing }) => {
                tracing::info!(
                    owner_id = %request.owner_id,
                    existing = %existing.id,
                    "Lost concurrent ingestion race to identical content"
                );
                return Ok(self.duplicate(*existing));
            }
            Err(error) => return Err(error.into()),
        };

        if let Err(error) = self.stores.corpus.put(&document, &request.text).await {
            tracing::error!(document_id = %document.id, error = %error, "Failed to store source text");
            if let Err(cleanup) = self.stores.documents.delete(&document.id).await {
                tracing::error!(document_id = %document.id, error = %cleanup, "Failed to roll back document record");
            }
            return Err(error.into());
        }

        let chunks = self.chunker.split(&document.id, &request.text);
        let total = chunks.len();
        let indexed = self.index_chunks(&document, chunks).await;

        let state = IndexState::from_counts(indexed, total);
        match self
            .stores
            .documents
            .set_index_state(&document.id, state)
            .await
        {
            Ok(()) => document.index_state = state,
            Err(error) => {
                tracing::error!(document_id = %document.id, state = state.as_str(), error = %error, "Failed to record index state");
            }
        }

        let status = if indexed == total {
            IngestStatus::Created
        } else {
            IngestStatus::Partial
        };
        let report = IngestReport {
            status,
            document_id: Some(document.id.clone()),
            indexed_chunk_count: indexed,
            total_chunk_count: total,
            similar_candidates: dedup.similar_candidates,
            unindexed: total > 0 && indexed == 0,
            document: Some(document),
        };

        tracing::info!(
            document_id = report.document_id.as_deref().unwrap_or_default(),
            owner_id = %request.owner_id,
            status = ?report.status,
            indexed,
            total,
            similar = report.similar_candidates.len(),
            "Document ingested"
        );
        self.metrics.record(&report);
        Ok(report)
    }

    fn duplicate(&self, existing: Document) -> IngestReport {
        let report = IngestReport {
            status: IngestStatus::Duplicate,
            document_id: Some(existing.id.clone()),
            document: Some(existing),
            indexed_chunk_count: 0,
            total_chunk_count: 0,
            similar_candidates: Vec::new(),
            unindexed: false,
        };
        self.metrics.record(&report);
        report
    }

    async fn index_chunks(&self, document: &Document, chunks: Vec<Chunk>) -> usize {
        let concurrency = self.settings.embed_concurrency.max(1);
        let outcomes: Vec<bool> = stream::iter(chunks)
            .map(|chunk| self.index_chunk(document, chunk))
            .buffer_unordered(concurrency)
            .collect()
            .await;
        outcomes.into_iter().filter(|indexed| *indexed).count()
    }

    async fn index_chunk(&self, document: &Document, chunk: Chunk) -> bool {
        let metadata = ChunkMetadata::for_chunk(document, &chunk);

        let vector = match tokio::time::timeout(
            self.settings.embed_timeout,
            self.embedder.embed(&chunk.text),
        )
        .await
        {
            Ok(Ok(vector)) => vector,
            Ok(Err(error)) => {
                tracing::warn!(document_id = %document.id, ordinal = chunk.ordinal, error = %error, "Chunk embedding failed");
                return false;
            }
            Err(_) => {
                tracing::warn!(
                    document_id = %document.id,
                    ordinal = chunk.ordinal,
                    timeout_ms = self.settings.embed_timeout.as_millis() as u64,
                    "Chunk embedding timed out"
                );
                return false;
            }
        };

        let vectors = &self.stores.vectors;
        let entry = IndexEntry {
            chunk_id: chunk.id.clone(),
            vector,
            text: chunk.text.clone(),
            metadata: metadata.clone(),
        };
        if let Err(error) = self
            .settings
            .write_retry
            .run("vector upsert", || vectors.upsert(entry.clone()))
            .await
        {
            tracing::warn!(document_id = %document.id, ordinal = chunk.ordinal, error = %error, "Vector index write failed");
            return false;
        }

        let texts = &self.stores.texts;
        let entry = TextEntry {
            chunk_id: chunk.id,
            text: chunk.text,
            metadata,
        };
        if let Err(error) = self
            .settings
            .write_retry
            .run("text upsert", || texts.upsert(entry.clone()))
            .await
        {
            tracing::warn!(document_id = %document.id, ordinal = chunk.ordinal, error = %error, "Text index write failed");
            return false;
        }

        true
    }
}
