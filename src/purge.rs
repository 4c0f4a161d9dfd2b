//! Document deletion across both indexes, the record store, and the corpus.
//!
//! Index purges run first and are retried. The record and the source text are only removed
//! once both indexes are clean, so a failed purge can simply be run again.

use crate::model::PurgeReport;
use crate::retry::RetryPolicy;
use crate::store::{DocumentStoreError, Stores};
use thiserror::Error;

/// Failures that stop a purge before any index is touched.
#[derive(Debug, Error)]
pub enum PurgeError {
    /// The document record could not be looked up.
    #[error(transparent)]
    Store(#[from] DocumentStoreError),
}

/// Removes a document and everything derived from it.
pub struct Purger {
    stores: Stores,
    retry: RetryPolicy,
}

impl Purger {
    /// Purger retrying each index delete per `retry`.
    pub fn new(stores: Stores, retry: RetryPolicy) -> Self {
        Self { stores, retry }
    }

    /// Purge `document_id`. Idempotent; an unknown id still purges any stray index entries.
    pub async fn purge(&self, document_id: &str) -> Result<PurgeReport, PurgeError> {
        let document = self.stores.documents.get(document_id).await?;

        let vectors = &self.stores.vectors;
        let vector_purged = match self
            .retry
            .run("vector purge", || vectors.delete_document(document_id))
            .await
        {
            Ok(()) => true,
            Err(error) => {
                tracing::error!(document_id, error = %error, "Vector index purge failed");
                false
            }
        };

        let texts = &self.stores.texts;
        let text_purged = match self
            .retry
            .run("text purge", || texts.delete_document(document_id))
            .await
        {
            Ok(()) => true,
            Err(error) => {
                tracing::error!(document_id, error = %error, "Text index purge failed");
                false
            }
        };

        let mut report = PurgeReport {
            document_id: document_id.to_string(),
            vector_purged,
            text_purged,
            record_removed: false,
        };
        if !report.is_complete() {
            tracing::error!(
                document_id,
                vector_purged,
                text_purged,
                "Purge incomplete; document record kept for retry"
            );
            return Ok(report);
        }

        if let Some(document) = document {
            if let Err(error) = self.stores.corpus.remove(&document).await {
                tracing::warn!(document_id, error = %error, "Failed to remove source text");
            }
            report.record_removed = self.stores.documents.delete(document_id).await?;
        }

        tracing::info!(document_id, record_removed = report.record_removed, "Document purged");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::{Chunker, ChunkerSettings};
    use crate::embedding::HashingEmbeddingClient;
    use crate::pipeline::{IndexingPipeline, PipelineSettings};
    use crate::store::{InMemoryTextIndex, InMemoryVectorIndex};
    use std::sync::Arc;

    #[tokio::test]
    async fn purge_removes_every_trace() {
        let vectors = Arc::new(InMemoryVectorIndex::new());
        let texts = Arc::new(InMemoryTextIndex::new());
        let stores = Stores {
            vectors: vectors.clone(),
            texts: texts.clone(),
            ..Stores::in_memory()
        };
        let pipeline = IndexingPipeline::new(
            stores.clone(),
            Arc::new(HashingEmbeddingClient::new(32)),
            Chunker::new(ChunkerSettings::default()).expect("chunker"),
            PipelineSettings::default(),
        );
        let report = pipeline
            .ingest("alice", "refund policy allows returns", "policy.txt", "text/plain")
            .await
            .expect("ingest");
        let document_id = report.document_id.expect("document id");
        assert_eq!(vectors.count_for_document(&document_id).await, 1);

        let purger = Purger::new(stores.clone(), RetryPolicy::none());
        let purged = purger.purge(&document_id).await.expect("purge");
        assert!(purged.is_complete());
        assert!(purged.record_removed);
        assert_eq!(vectors.count_for_document(&document_id).await, 0);
        assert_eq!(texts.count_for_document(&document_id).await, 0);
        assert!(stores.documents.get(&document_id).await.expect("get").is_none());

        let again = purger.purge(&document_id).await.expect("second purge");
        assert!(again.is_complete());
        assert!(!again.record_removed);
    }
}
