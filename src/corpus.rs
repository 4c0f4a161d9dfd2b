//! Original source storage and the live-scan search tier.
//!
//! [`FsCorpus`] keeps each document's extracted text at `<root>/<owner>/<document_id>.txt`.
//! [`LiveCorpusScanner`] bypasses both indexes: it re-reads every source the owner has,
//! re-chunks it with the ingestion chunker so hits point at the same chunk ids the indexes
//! would have used, and keeps chunks that contain the query. A match that only exists across
//! a chunk boundary is reported against the chunk where it starts.

use crate::chunking::Chunker;
use crate::model::{Document, SearchResult, SourceTier};
use crate::store::{CorpusError, CorpusStore, DocumentStore, DocumentStoreError, QueryMatcher};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Default snippet length for live hits, in characters.
pub const DEFAULT_SNIPPET_CHARS: usize = 240;

/// Filesystem-backed [`CorpusStore`].
#[derive(Debug, Clone)]
pub struct FsCorpus {
    root: PathBuf,
}

impl FsCorpus {
    /// Store sources under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, document: &Document) -> PathBuf {
        self.root
            .join(owner_dir(&document.owner_id))
            .join(format!("{}.txt", document.id))
    }
}

/// Directory-safe rendering of an owner id.
fn owner_dir(owner_id: &str) -> String {
    let cleaned: String = owner_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

fn io_error(document: &Document, error: std::io::Error) -> CorpusError {
    CorpusError::Io {
        document_id: document.id.clone(),
        reason: error.to_string(),
    }
}

#[async_trait]
impl CorpusStore for FsCorpus {
    async fn put(&self, document: &Document, text: &str) -> Result<(), CorpusError> {
        let path = self.path_for(document);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|error| io_error(document, error))?;
        }
        let staging = path.with_extension("txt.partial");
        tokio::fs::write(&staging, text)
            .await
            .map_err(|error| io_error(document, error))?;
        tokio::fs::rename(&staging, &path)
            .await
            .map_err(|error| io_error(document, error))?;
        tracing::debug!(document_id = %document.id, path = %path.display(), "Stored source text");
        Ok(())
    }

    async fn read(&self, document: &Document) -> Result<String, CorpusError> {
        match tokio::fs::read_to_string(self.path_for(document)).await {
            Ok(text) => Ok(text),
            Err(error) if error.kind() == ErrorKind::NotFound => Err(CorpusError::Missing {
                document_id: document.id.clone(),
            }),
            Err(error) => Err(io_error(document, error)),
        }
    }

    async fn remove(&self, document: &Document) -> Result<(), CorpusError> {
        match tokio::fs::remove_file(self.path_for(document)).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(error) => Err(io_error(document, error)),
        }
    }
}

/// The live tier could not read the sources it needed.
#[derive(Debug, Error)]
pub enum CorpusScanError {
    /// The owner's documents could not be listed.
    #[error("failed to list documents for live scan: {0}")]
    Listing(#[from] DocumentStoreError),
    /// A source could not be read and nothing else matched.
    #[error(transparent)]
    Source(#[from] CorpusError),
}

/// Substring scan over original sources.
pub struct LiveCorpusScanner {
    documents: Arc<dyn DocumentStore>,
    corpus: Arc<dyn CorpusStore>,
    chunker: Chunker,
    confidence: f32,
    snippet_chars: usize,
}

impl LiveCorpusScanner {
    /// Build a scanner assigning `confidence` to every hit.
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        corpus: Arc<dyn CorpusStore>,
        chunker: Chunker,
        confidence: f32,
    ) -> Self {
        Self {
            documents,
            corpus,
            chunker,
            confidence,
            snippet_chars: DEFAULT_SNIPPET_CHARS,
        }
    }

    /// Limit excerpts to `snippet_chars` characters.
    pub fn with_snippet_chars(mut self, snippet_chars: usize) -> Self {
        self.snippet_chars = snippet_chars;
        self
    }

    /// Up to `k` chunks of `owner_id`'s sources that contain `query`.
    ///
    /// Unreadable sources are skipped with a warning. If nothing matched and at least one
    /// source was unreadable, the first read failure is returned instead of an empty list.
    pub async fn scan(
        &self,
        owner_id: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<SearchResult>, CorpusScanError> {
        let Some(matcher) = QueryMatcher::new(query) else {
            return Ok(Vec::new());
        };
        if k == 0 {
            return Ok(Vec::new());
        }

        let documents = self.documents.list_by_owner(owner_id).await?;
        let mut results = Vec::new();
        let mut first_failure: Option<CorpusError> = None;
        let mut scanned = 0usize;

        'documents: for document in &documents {
            let text = match self.corpus.read(document).await {
                Ok(text) => text,
                Err(error) => {
                    tracing::warn!(document_id = %document.id, error = %error, "Live scan skipped unreadable source");
                    if first_failure.is_none() {
                        first_failure = Some(error);
                    }
                    continue;
                }
            };
            scanned += 1;

            if !matcher.matches(&text) {
                continue;
            }

            let chunks = self.chunker.split(&document.id, &text);
            let mut chunk_hit = false;
            for chunk in &chunks {
                if !matcher.matches(&chunk.text) {
                    continue;
                }
                chunk_hit = true;
                let snippet = matcher.excerpt(&chunk.text, self.snippet_chars);
                results.push(self.hit(document, &chunk.id, snippet));
                if results.len() >= k {
                    break 'documents;
                }
            }

            // The match spans a chunk boundary: point at the chunk where it starts.
            if !chunk_hit {
                let position = matcher.first_match_position(&text).unwrap_or(0);
                if let Some(chunk) = chunks
                    .iter()
                    .find(|chunk| position < chunk.start_word + chunk.word_count)
                {
                    let snippet = matcher.excerpt(&text, self.snippet_chars);
                    results.push(self.hit(document, &chunk.id, snippet));
                    if results.len() >= k {
                        break 'documents;
                    }
                }
            }
        }

        tracing::debug!(
            owner_id,
            documents = documents.len(),
            scanned,
            hits = results.len(),
            "Live scan finished"
        );

        match first_failure {
            Some(error) if results.is_empty() => Err(error.into()),
            _ => Ok(results),
        }
    }

    fn hit(&self, document: &Document, chunk_id: &str, snippet: String) -> SearchResult {
        SearchResult {
            chunk_id: chunk_id.to_string(),
            document_id: document.id.clone(),
            display_name: document.display_name.clone(),
            score: self.confidence,
            snippet,
            source_tier: SourceTier::Live,
        }
    }
}
