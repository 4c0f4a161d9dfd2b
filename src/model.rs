//! Core data types flowing through ingestion and retrieval.

use crate::hashing::Fingerprint;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use time::OffsetDateTime;

/// Indexing progress recorded on a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexState {
    /// Record created, chunks not yet written.
    Pending,
    /// Text produced zero chunks (e.g. binary upload with nothing extracted).
    Empty,
    /// Every chunk reached both indexes.
    Indexed,
    /// Some, but not all, chunks reached both indexes.
    Partial,
    /// No chunk could be indexed; only the live scan can find this document.
    Unindexed,
}

impl IndexState {
    /// Storage label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Empty => "empty",
            Self::Indexed => "indexed",
            Self::Partial => "partial",
            Self::Unindexed => "unindexed",
        }
    }

    /// Derive the state from per-document chunk counters.
    pub fn from_counts(indexed: usize, total: usize) -> Self {
        if total == 0 {
            Self::Empty
        } else if indexed == total {
            Self::Indexed
        } else if indexed == 0 {
            Self::Unindexed
        } else {
            Self::Partial
        }
    }
}

impl std::str::FromStr for IndexState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "empty" => Ok(Self::Empty),
            "indexed" => Ok(Self::Indexed),
            "partial" => Ok(Self::Partial),
            "unindexed" => Ok(Self::Unindexed),
            other => Err(format!("unknown index state '{other}'")),
        }
    }
}

/// An ingested document, scoped to its owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Opaque stable identifier.
    pub id: String,
    /// Owner scope; duplicates are only detected within one owner.
    pub owner_id: String,
    /// Name shown in search results.
    pub display_name: String,
    /// Filename as uploaded.
    pub original_name: String,
    /// MIME type reported by the upload layer.
    pub mime_type: String,
    /// Size of the extracted text in bytes.
    pub byte_size: u64,
    /// Fingerprint of the whitespace-normalized text.
    pub content_hash: Fingerprint,
    /// Fingerprint of the normalized filename.
    pub name_hash: Fingerprint,
    /// Creation time.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// How far indexing got for this document.
    pub index_state: IndexState,
    /// Open-ended metadata carried alongside the record.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// A bounded window of a document's words.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Deterministic identifier derived from `(document_id, ordinal)`.
    pub id: String,
    /// Owning document.
    pub document_id: String,
    /// Zero-based position among the document's chunks.
    pub ordinal: usize,
    /// Window text (words joined by single spaces).
    pub text: String,
    /// Index of the first source word covered by this chunk.
    pub start_word: usize,
    /// Number of source words in the window.
    pub word_count: usize,
    /// Rough token count for the window.
    pub token_estimate: usize,
}

/// Metadata denormalized into both indexes so hits are self-describing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Owning document.
    pub document_id: String,
    /// Owner scope used to filter queries.
    pub owner_id: String,
    /// Chunk position.
    pub ordinal: usize,
    /// Document display name.
    pub display_name: String,
    /// Document MIME type.
    pub mime_type: String,
    /// Provider-specific extras.
    #[serde(default)]
    pub extra: Map<String, Value>,
}

impl ChunkMetadata {
    /// Build chunk metadata from its document.
    pub fn for_chunk(document: &Document, chunk: &Chunk) -> Self {
        Self {
            document_id: document.id.clone(),
            owner_id: document.owner_id.clone(),
            ordinal: chunk.ordinal,
            display_name: document.display_name.clone(),
            mime_type: document.mime_type.clone(),
            extra: document.metadata.clone(),
        }
    }
}

/// A vector-side entry.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    /// Chunk identifier; doubles as the vector point id.
    pub chunk_id: String,
    /// Embedding of the chunk text.
    pub vector: Vec<f32>,
    /// Chunk text, stored so hits can render a snippet.
    pub text: String,
    /// Denormalized document metadata.
    pub metadata: ChunkMetadata,
}

/// A text-side entry.
#[derive(Debug, Clone, PartialEq)]
pub struct TextEntry {
    /// Chunk identifier.
    pub chunk_id: String,
    /// Chunk text.
    pub text: String,
    /// Denormalized document metadata.
    pub metadata: ChunkMetadata,
}

/// Raw match returned by a vector or text index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHit {
    /// Matched chunk.
    pub chunk_id: String,
    /// Similarity in `[0, 1]` for vector hits; lexical rank for text hits.
    pub score: f32,
    /// Chunk text.
    pub text: String,
    /// Denormalized document metadata.
    pub metadata: ChunkMetadata,
}

/// Search strategy that produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTier {
    /// Semantic similarity over embeddings.
    Vector,
    /// Keyword match over the text index.
    Text,
    /// Substring scan of the original sources.
    Live,
}

impl fmt::Display for SourceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Vector => "vector",
            Self::Text => "text",
            Self::Live => "live",
        })
    }
}

/// One item of a search response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Matched chunk.
    pub chunk_id: String,
    /// Document the chunk belongs to.
    pub document_id: String,
    /// Document display name for rendering.
    pub display_name: String,
    /// Normalized similarity (vector) or the tier's fixed confidence (text, live).
    pub score: f32,
    /// Excerpt around the match.
    pub snippet: String,
    /// Tier that produced the whole response.
    pub source_tier: SourceTier,
}

/// Outcome label for an ingestion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestStatus {
    /// Document created and every chunk indexed.
    Created,
    /// Content already exists for this owner; nothing was written.
    Duplicate,
    /// Document created but some or all chunks failed to index.
    Partial,
}

/// Per-document ingestion report.
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    /// Outcome label.
    pub status: IngestStatus,
    /// New document id, or the existing one for duplicates.
    pub document_id: Option<String>,
    /// The created (or pre-existing duplicate) document.
    pub document: Option<Document>,
    /// Chunks that reached both indexes.
    pub indexed_chunk_count: usize,
    /// Chunks produced by the chunker.
    pub total_chunk_count: usize,
    /// Existing documents with a similar filename; advisory only.
    pub similar_candidates: Vec<Document>,
    /// True when chunks exist but none could be indexed.
    pub unindexed: bool,
}

impl IngestReport {
    /// Number of chunks that failed to index.
    pub fn warning_count(&self) -> usize {
        self.total_chunk_count - self.indexed_chunk_count
    }
}

/// Result of purging a document from both indexes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    /// Purged document.
    pub document_id: String,
    /// Vector index no longer references the document.
    pub vector_purged: bool,
    /// Text index no longer references the document.
    pub text_purged: bool,
    /// Document record and corpus source were removed.
    pub record_removed: bool,
}

impl PurgeReport {
    /// Both indexes are clean.
    pub fn is_complete(&self) -> bool {
        self.vector_purged && self.text_purged
    }
}

/// Truncate text to at most `max_chars` characters on a word boundary.
pub fn snippet(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }
    let cut = trimmed
        .char_indices()
        .nth(max_chars)
        .map(|(idx, _)| idx)
        .unwrap_or(trimmed.len());
    let head = &trimmed[..cut];
    let head = head.rfind(char::is_whitespace).map_or(head, |pos| &head[..pos]);
    format!("{}...", head.trim_end())
}
