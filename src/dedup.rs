//! Ingestion-time duplicate detection.
//!
//! Two checks with different weight: identical content for the same owner blocks ingestion,
//! while a similar filename only produces advisory candidates. Filenames are compared after
//! [`normalize_name`] using normalized Levenshtein similarity.

use crate::hashing::{Fingerprint, hash_content, hash_name, normalize_name};
use crate::model::Document;
use crate::store::{DocumentStore, DocumentStoreError};
use std::sync::Arc;
use strsim::normalized_levenshtein;

/// Default minimum filename similarity for a near-duplicate hint.
pub const DEFAULT_FILENAME_SIMILARITY_THRESHOLD: f64 = 0.8;

/// Outcome of [`Deduplicator::check`].
#[derive(Debug, Clone)]
pub struct DedupReport {
    /// Fingerprint of the incoming content.
    pub content_hash: Fingerprint,
    /// Fingerprint of the incoming normalized filename.
    pub name_hash: Fingerprint,
    /// Existing document with identical content; ingestion must stop when set.
    pub exact_duplicate: Option<Document>,
    /// Existing documents whose filenames look alike, most similar first.
    pub similar_candidates: Vec<Document>,
}

impl DedupReport {
    /// Whether ingestion must be refused.
    pub fn is_duplicate(&self) -> bool {
        self.exact_duplicate.is_some()
    }
}

/// Similarity of two filenames in `[0, 1]` after normalization.
pub fn filename_similarity(a: &str, b: &str) -> f64 {
    normalized_levenshtein(&normalize_name(a), &normalize_name(b))
}

/// Duplicate detection against an owner's existing documents.
pub struct Deduplicator {
    documents: Arc<dyn DocumentStore>,
    filename_threshold: f64,
}

impl Deduplicator {
    /// Build a deduplicator with the given filename similarity threshold.
    pub fn new(documents: Arc<dyn DocumentStore>, filename_threshold: f64) -> Self {
        Self {
            documents,
            filename_threshold,
        }
    }

    /// Classify an incoming document as an exact duplicate, near-duplicate, or novel.
    pub async fn check(
        &self,
        owner_id: &str,
        content: &str,
        filename: &str,
    ) -> Result<DedupReport, DocumentStoreError> {
        let content_hash = hash_content(content);
        let name_hash = hash_name(filename);

        // Wordless documents (images, binaries) all share one fingerprint and are never duplicates.
        let existing = if content_hash.is_empty_content() {
            None
        } else {
            self.documents
                .find_by_content_hash(owner_id, &content_hash)
                .await?
        };
        if let Some(existing) = existing {
            tracing::info!(
                owner_id,
                existing = %existing.id,
                content_hash = %content_hash,
                "Exact duplicate detected"
            );
            return Ok(DedupReport {
                content_hash,
                name_hash,
                exact_duplicate: Some(existing),
                similar_candidates: Vec::new(),
            });
        }

        let mut scored: Vec<(f64, Document)> = self
            .documents
            .list_by_owner(owner_id)
            .await?
            .into_iter()
            .filter_map(|document| {
                let similarity = if document.name_hash == name_hash {
                    1.0
                } else {
                    filename_similarity(&document.original_name, filename)
                };
                (similarity >= self.filename_threshold).then_some((similarity, document))
            })
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        if !scored.is_empty() {
            tracing::debug!(
                owner_id,
                filename,
                candidates = scored.len(),
                "Similar filenames found"
            );
        }

        Ok(DedupReport {
            content_hash,
            name_hash,
            exact_duplicate: None,
            similar_candidates: scored.into_iter().map(|(_, document)| document).collect(),
        })
    }
}
