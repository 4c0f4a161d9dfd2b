//! Storage capabilities consumed by ingestion, retrieval, and purge.
//!
//! Each backend concern sits behind its own async trait so the pipeline and retriever can be
//! wired to Qdrant/SQLite in production and to in-memory fakes in tests:
//!
//! - [`VectorIndex`]: similarity search over chunk embeddings.
//! - [`TextIndex`]: keyword search over chunk text.
//! - [`DocumentStore`]: document records, unique per `(owner_id, content_hash)` unless the
//!   document has no text.
//! - [`CorpusStore`]: original extracted text, read by the live scan.
//!
//! Every read is scoped to an owner; no query ever returns another owner's chunks.

pub mod matching;
pub mod memory;

pub use matching::QueryMatcher;
pub use memory::{InMemoryCorpus, InMemoryDocumentStore, InMemoryTextIndex, InMemoryVectorIndex};

use crate::hashing::Fingerprint;
use crate::model::{Document, IndexEntry, IndexHit, IndexState, TextEntry};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// A write to an index failed.
#[derive(Debug, Error)]
#[error("{store} write failed: {reason}")]
pub struct IndexWriteError {
    /// Index that rejected the write.
    pub store: &'static str,
    /// Backend-specific reason.
    pub reason: String,
}

impl IndexWriteError {
    /// Build an error for `store`.
    pub fn new(store: &'static str, reason: impl Into<String>) -> Self {
        Self {
            store,
            reason: reason.into(),
        }
    }
}

/// A query against an index failed.
#[derive(Debug, Error)]
#[error("{store} query failed: {reason}")]
pub struct IndexReadError {
    /// Index that failed to answer.
    pub store: &'static str,
    /// Backend-specific reason.
    pub reason: String,
}

impl IndexReadError {
    /// Build an error for `store`.
    pub fn new(store: &'static str, reason: impl Into<String>) -> Self {
        Self {
            store,
            reason: reason.into(),
        }
    }
}

/// Errors raised by document record storage.
#[derive(Debug, Error)]
pub enum DocumentStoreError {
    /// The owner already has a document with this content fingerprint.
    #[error("document with identical content already exists: {}", existing.id)]
    Duplicate {
        /// The record that won.
        existing: Box<Document>,
    },
    /// No record with the given id.
    #[error("document {0} not found")]
    NotFound(String),
    /// Storage backend failure.
    #[error("document store failure: {0}")]
    Backend(String),
}

/// Errors raised while writing or reading original document text.
#[derive(Debug, Error)]
pub enum CorpusError {
    /// The source for a known document is gone.
    #[error("source text for document {document_id} is missing")]
    Missing {
        /// Document whose source could not be found.
        document_id: String,
    },
    /// Filesystem or backend failure.
    #[error("corpus I/O failed for document {document_id}: {reason}")]
    Io {
        /// Document being accessed.
        document_id: String,
        /// Underlying failure.
        reason: String,
    },
}

/// Semantic nearest-neighbour index over chunk embeddings.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace the entry keyed by its chunk id.
    async fn upsert(&self, entry: IndexEntry) -> Result<(), IndexWriteError>;

    /// Up to `k` of `owner_id`'s chunks with normalized similarity `>= threshold`, best first.
    async fn query(
        &self,
        owner_id: &str,
        vector: &[f32],
        k: usize,
        threshold: f32,
    ) -> Result<Vec<IndexHit>, IndexReadError>;

    /// Remove every entry belonging to `document_id`. Removing nothing is not an error.
    async fn delete_document(&self, document_id: &str) -> Result<(), IndexWriteError>;
}

/// Keyword index over chunk text.
#[async_trait]
pub trait TextIndex: Send + Sync {
    /// Insert or replace the entry keyed by its chunk id.
    async fn upsert(&self, entry: TextEntry) -> Result<(), IndexWriteError>;

    /// Up to `k` of `owner_id`'s chunks matching `query`, best first.
    async fn query(
        &self,
        owner_id: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<IndexHit>, IndexReadError>;

    /// Remove every entry belonging to `document_id`. Removing nothing is not an error.
    async fn delete_document(&self, document_id: &str) -> Result<(), IndexWriteError>;
}

/// Persistent document records.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Persist a new record.
    ///
    /// Must be atomic with respect to `(owner_id, content_hash)`: when a record with the same
    /// pair already exists the call returns [`DocumentStoreError::Duplicate`] carrying it and
    /// writes nothing. Records whose fingerprint
    /// [`is_empty_content`](crate::hashing::Fingerprint::is_empty_content) never conflict.
    async fn insert(&self, document: &Document) -> Result<Document, DocumentStoreError>;

    /// Fetch a record by id.
    async fn get(&self, document_id: &str) -> Result<Option<Document>, DocumentStoreError>;

    /// The owner's record with this content fingerprint, if any.
    async fn find_by_content_hash(
        &self,
        owner_id: &str,
        content_hash: &Fingerprint,
    ) -> Result<Option<Document>, DocumentStoreError>;

    /// Every record belonging to `owner_id`, oldest first.
    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Document>, DocumentStoreError>;

    /// Update the indexing state of a record.
    async fn set_index_state(
        &self,
        document_id: &str,
        state: IndexState,
    ) -> Result<(), DocumentStoreError>;

    /// Delete a record. Returns whether a record was removed.
    async fn delete(&self, document_id: &str) -> Result<bool, DocumentStoreError>;
}

/// Original extracted text, keyed by document.
#[async_trait]
pub trait CorpusStore: Send + Sync {
    /// Store the extracted text of `document`.
    async fn put(&self, document: &Document, text: &str) -> Result<(), CorpusError>;

    /// Read back the extracted text of `document`.
    async fn read(&self, document: &Document) -> Result<String, CorpusError>;

    /// Drop the stored text. Removing a missing source is not an error.
    async fn remove(&self, document: &Document) -> Result<(), CorpusError>;
}

/// The four storage capabilities, shared by ingestion, retrieval, and purge.
#[derive(Clone)]
pub struct Stores {
    /// Document records.
    pub documents: Arc<dyn DocumentStore>,
    /// Original extracted text.
    pub corpus: Arc<dyn CorpusStore>,
    /// Embedding index.
    pub vectors: Arc<dyn VectorIndex>,
    /// Keyword index.
    pub texts: Arc<dyn TextIndex>,
}

impl Stores {
    /// Fresh in-memory capabilities.
    pub fn in_memory() -> Self {
        Self {
            documents: Arc::new(InMemoryDocumentStore::new()),
            corpus: Arc::new(InMemoryCorpus::new()),
            vectors: Arc::new(InMemoryVectorIndex::new()),
            texts: Arc::new(InMemoryTextIndex::new()),
        }
    }
}
