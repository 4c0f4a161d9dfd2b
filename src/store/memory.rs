//! In-memory implementations of every storage capability.
//!
//! Used by `VECTOR_STORE=memory` runs and as the base for test doubles. Vector search is
//! brute-force cosine similarity; keyword search is [`QueryMatcher`] over every stored chunk.

use super::{
    CorpusError, CorpusStore, DocumentStore, DocumentStoreError, IndexReadError, IndexWriteError,
    QueryMatcher, TextIndex, VectorIndex,
};
use crate::embedding::{cosine_similarity, normalize_similarity};
use crate::hashing::Fingerprint;
use crate::model::{Document, IndexEntry, IndexHit, IndexState, TextEntry};
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::HashMap;
use tokio::sync::RwLock;

fn rank(hits: &mut Vec<IndexHit>, k: usize) {
    hits.sort_by(|a, b| match b.score.total_cmp(&a.score) {
        Ordering::Equal => (&a.metadata.document_id, a.metadata.ordinal)
            .cmp(&(&b.metadata.document_id, b.metadata.ordinal)),
        other => other,
    });
    hits.truncate(k);
}

/// Brute-force vector index.
#[derive(Debug, Default)]
pub struct InMemoryVectorIndex {
    entries: RwLock<HashMap<String, IndexEntry>>,
}

impl InMemoryVectorIndex {
    /// Empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries belonging to `document_id`.
    pub async fn count_for_document(&self, document_id: &str) -> usize {
        self.entries
            .read()
            .await
            .values()
            .filter(|entry| entry.metadata.document_id == document_id)
            .count()
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn upsert(&self, entry: IndexEntry) -> Result<(), IndexWriteError> {
        self.entries
            .write()
            .await
            .insert(entry.chunk_id.clone(), entry);
        Ok(())
    }

    async fn query(
        &self,
        owner_id: &str,
        vector: &[f32],
        k: usize,
        threshold: f32,
    ) -> Result<Vec<IndexHit>, IndexReadError> {
        let entries = self.entries.read().await;
        let mut hits: Vec<IndexHit> = entries
            .values()
            .filter(|entry| entry.metadata.owner_id == owner_id)
            .filter_map(|entry| {
                let score = normalize_similarity(cosine_similarity(vector, &entry.vector));
                (score >= threshold).then(|| IndexHit {
                    chunk_id: entry.chunk_id.clone(),
                    score,
                    text: entry.text.clone(),
                    metadata: entry.metadata.clone(),
                })
            })
            .collect();
        rank(&mut hits, k);
        Ok(hits)
    }

    async fn delete_document(&self, document_id: &str) -> Result<(), IndexWriteError> {
        self.entries
            .write()
            .await
            .retain(|_, entry| entry.metadata.document_id != document_id);
        Ok(())
    }
}

/// Keyword index matching with [`QueryMatcher`].
#[derive(Debug, Default)]
pub struct InMemoryTextIndex {
    entries: RwLock<HashMap<String, TextEntry>>,
}

impl InMemoryTextIndex {
    /// Empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries belonging to `document_id`.
    pub async fn count_for_document(&self, document_id: &str) -> usize {
        self.entries
            .read()
            .await
            .values()
            .filter(|entry| entry.metadata.document_id == document_id)
            .count()
    }
}

#[async_trait]
impl TextIndex for InMemoryTextIndex {
    async fn upsert(&self, entry: TextEntry) -> Result<(), IndexWriteError> {
        self.entries
            .write()
            .await
            .insert(entry.chunk_id.clone(), entry);
        Ok(())
    }

    async fn query(
        &self,
        owner_id: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<IndexHit>, IndexReadError> {
        let Some(matcher) = QueryMatcher::new(query) else {
            return Ok(Vec::new());
        };
        let entries = self.entries.read().await;
        let mut hits: Vec<IndexHit> = entries
            .values()
            .filter(|entry| entry.metadata.owner_id == owner_id)
            .filter_map(|entry| {
                let relevance = matcher.relevance(&entry.text);
                (relevance > 0).then(|| IndexHit {
                    chunk_id: entry.chunk_id.clone(),
                    score: relevance as f32,
                    text: entry.text.clone(),
                    metadata: entry.metadata.clone(),
                })
            })
            .collect();
        rank(&mut hits, k);
        Ok(hits)
    }

    async fn delete_document(&self, document_id: &str) -> Result<(), IndexWriteError> {
        self.entries
            .write()
            .await
            .retain(|_, entry| entry.metadata.document_id != document_id);
        Ok(())
    }
}

/// Document records held in insertion order.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    documents: RwLock<Vec<Document>>,
}

impl InMemoryDocumentStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn insert(&self, document: &Document) -> Result<Document, DocumentStoreError> {
        let mut documents = self.documents.write().await;
        let conflict = if document.content_hash.is_empty_content() {
            None
        } else {
            documents.iter().find(|existing| {
                existing.owner_id == document.owner_id
                    && existing.content_hash == document.content_hash
            })
        };
        if let Some(existing) = conflict {
            return Err(DocumentStoreError::Duplicate {
                existing: Box::new(existing.clone()),
            });
        }
        documents.push(document.clone());
        Ok(document.clone())
    }

    async fn get(&self, document_id: &str) -> Result<Option<Document>, DocumentStoreError> {
        Ok(self
            .documents
            .read()
            .await
            .iter()
            .find(|document| document.id == document_id)
            .cloned())
    }

    async fn find_by_content_hash(
        &self,
        owner_id: &str,
        content_hash: &Fingerprint,
    ) -> Result<Option<Document>, DocumentStoreError> {
        Ok(self
            .documents
            .read()
            .await
            .iter()
            .find(|document| {
                document.owner_id == owner_id && document.content_hash == *content_hash
            })
            .cloned())
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Document>, DocumentStoreError> {
        Ok(self
            .documents
            .read()
            .await
            .iter()
            .filter(|document| document.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn set_index_state(
        &self,
        document_id: &str,
        state: IndexState,
    ) -> Result<(), DocumentStoreError> {
        let mut documents = self.documents.write().await;
        let document = documents
            .iter_mut()
            .find(|document| document.id == document_id)
            .ok_or_else(|| DocumentStoreError::NotFound(document_id.to_string()))?;
        document.index_state = state;
        Ok(())
    }

    async fn delete(&self, document_id: &str) -> Result<bool, DocumentStoreError> {
        let mut documents = self.documents.write().await;
        let before = documents.len();
        documents.retain(|document| document.id != document_id);
        Ok(documents.len() != before)
    }
}

/// Source texts keyed by document id.
#[derive(Debug, Default)]
pub struct InMemoryCorpus {
    sources: RwLock<HashMap<String, String>>,
}

impl InMemoryCorpus {
    /// Empty corpus.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CorpusStore for InMemoryCorpus {
    async fn put(&self, document: &Document, text: &str) -> Result<(), CorpusError> {
        self.sources
            .write()
            .await
            .insert(document.id.clone(), text.to_string());
        Ok(())
    }

    async fn read(&self, document: &Document) -> Result<String, CorpusError> {
        self.sources
            .read()
            .await
            .get(&document.id)
            .cloned()
            .ok_or_else(|| CorpusError::Missing {
                document_id: document.id.clone(),
            })
    }

    async fn remove(&self, document: &Document) -> Result<(), CorpusError> {
        self.sources.write().await.remove(&document.id);
        Ok(())
    }
}
