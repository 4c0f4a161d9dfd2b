//! SQLite persistence: document records and the FTS5 keyword index.
//!
//! One database file holds three tables:
//!
//! - `documents`: one row per [`Document`], with a partial unique index on
//!   `(owner_id, content_hash)` so concurrent ingestion of identical content can only ever
//!   create one record. Rows without text are left out of the index.
//! - `chunk_text`: chunk text plus its serialized [`ChunkMetadata`].
//! - `chunks_fts`: FTS5 virtual table over chunk text, ranked with `bm25`.

use crate::hashing::{EMPTY_CONTENT_HEX, Fingerprint};
use crate::model::{ChunkMetadata, Document, IndexHit, IndexState, TextEntry};
use crate::store::{
    DocumentStore, DocumentStoreError, IndexReadError, IndexWriteError, QueryMatcher, TextIndex,
};
use async_trait::async_trait;
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

const STORE: &str = "sqlite-fts";

/// Document records and keyword index sharing one SQLite pool.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path` and apply the schema.
    pub async fn open(path: &Path) -> Result<Self, sqlx::Error> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        tracing::debug!(path = %path.display(), "SQLite store ready");
        Ok(store)
    }

    /// Close the pool, flushing the WAL.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn migrate(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                display_name TEXT NOT NULL,
                original_name TEXT NOT NULL,
                mime_type TEXT NOT NULL,
                byte_size INTEGER NOT NULL,
                content_hash TEXT NOT NULL,
                name_hash TEXT NOT NULL,
                created_at TEXT NOT NULL,
                index_state TEXT NOT NULL,
                metadata_json TEXT NOT NULL DEFAULT '{}'
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunk_text (
                chunk_id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                owner_id TEXT NOT NULL,
                text TEXT NOT NULL,
                metadata_json TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
                chunk_id UNINDEXED,
                document_id UNINDEXED,
                owner_id UNINDEXED,
                text
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_documents_owner_content \
             ON documents(owner_id, content_hash) WHERE content_hash != '{EMPTY_CONTENT_HEX}'"
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_owner ON documents(owner_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_chunk_text_document ON chunk_text(document_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn backend(error: impl std::fmt::Display) -> DocumentStoreError {
    DocumentStoreError::Backend(error.to_string())
}

fn document_from_row(row: &SqliteRow) -> Result<Document, DocumentStoreError> {
    let content_hash: String = row.get("content_hash");
    let name_hash: String = row.get("name_hash");
    let created_at: String = row.get("created_at");
    let index_state: String = row.get("index_state");
    let metadata_json: String = row.get("metadata_json");
    let byte_size: i64 = row.get("byte_size");

    Ok(Document {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        display_name: row.get("display_name"),
        original_name: row.get("original_name"),
        mime_type: row.get("mime_type"),
        byte_size: u64::try_from(byte_size).map_err(backend)?,
        content_hash: content_hash.parse::<Fingerprint>().map_err(backend)?,
        name_hash: name_hash.parse::<Fingerprint>().map_err(backend)?,
        created_at: OffsetDateTime::parse(&created_at, &Rfc3339).map_err(backend)?,
        index_state: index_state.parse::<IndexState>().map_err(backend)?,
        metadata: serde_json::from_str(&metadata_json).map_err(backend)?,
    })
}

const DOCUMENT_COLUMNS: &str = "id, owner_id, display_name, original_name, mime_type, byte_size, \
     content_hash, name_hash, created_at, index_state, metadata_json";

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn insert(&self, document: &Document) -> Result<Document, DocumentStoreError> {
        let created_at = document.created_at.format(&Rfc3339).map_err(backend)?;
        let metadata_json = serde_json::to_string(&document.metadata).map_err(backend)?;
        let byte_size = i64::try_from(document.byte_size).map_err(backend)?;

        let result = sqlx::query(
            r#"
            INSERT INTO documents (id, owner_id, display_name, original_name, mime_type,
                                   byte_size, content_hash, name_hash, created_at,
                                   index_state, metadata_json)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&document.id)
        .bind(&document.owner_id)
        .bind(&document.display_name)
        .bind(&document.original_name)
        .bind(&document.mime_type)
        .bind(byte_size)
        .bind(document.content_hash.to_hex())
        .bind(document.name_hash.to_hex())
        .bind(created_at)
        .bind(document.index_state.as_str())
        .bind(metadata_json)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(document.clone()),
            Err(sqlx::Error::Database(error)) if error.is_unique_violation() => {
                match self
                    .find_by_content_hash(&document.owner_id, &document.content_hash)
                    .await?
                {
                    Some(existing) => Err(DocumentStoreError::Duplicate {
                        existing: Box::new(existing),
                    }),
                    None => Err(backend(error)),
                }
            }
            Err(error) => Err(backend(error)),
        }
    }

    async fn get(&self, document_id: &str) -> Result<Option<Document>, DocumentStoreError> {
        let row = sqlx::query(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?"
        ))
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.as_ref().map(document_from_row).transpose()
    }

    async fn find_by_content_hash(
        &self,
        owner_id: &str,
        content_hash: &Fingerprint,
    ) -> Result<Option<Document>, DocumentStoreError> {
        let row = sqlx::query(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE owner_id = ? AND content_hash = ?"
        ))
        .bind(owner_id)
        .bind(content_hash.to_hex())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;
        row.as_ref().map(document_from_row).transpose()
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<Document>, DocumentStoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE owner_id = ? ORDER BY created_at, id"
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        rows.iter().map(document_from_row).collect()
    }

    async fn set_index_state(
        &self,
        document_id: &str,
        state: IndexState,
    ) -> Result<(), DocumentStoreError> {
        let result = sqlx::query("UPDATE documents SET index_state = ? WHERE id = ?")
            .bind(state.as_str())
            .bind(document_id)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        if result.rows_affected() == 0 {
            return Err(DocumentStoreError::NotFound(document_id.to_string()));
        }
        Ok(())
    }

    async fn delete(&self, document_id: &str) -> Result<bool, DocumentStoreError> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(document_id)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(result.rows_affected() > 0)
    }
}

/// FTS5 expression requiring every query term, each quoted so punctuation is never parsed as
/// query syntax.
fn fts_expression(matcher: &QueryMatcher) -> Option<String> {
    if matcher.terms().is_empty() {
        return None;
    }
    Some(
        matcher
            .terms()
            .iter()
            .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
            .collect::<Vec<_>>()
            .join(" "),
    )
}

#[async_trait]
impl TextIndex for SqliteStore {
    async fn upsert(&self, entry: TextEntry) -> Result<(), IndexWriteError> {
        let write_error = |error: sqlx::Error| IndexWriteError::new(STORE, error.to_string());
        let metadata_json = serde_json::to_string(&entry.metadata)
            .map_err(|error| IndexWriteError::new(STORE, error.to_string()))?;

        let mut tx = self.pool.begin().await.map_err(write_error)?;
        sqlx::query("DELETE FROM chunks_fts WHERE chunk_id = ?")
            .bind(&entry.chunk_id)
            .execute(&mut *tx)
            .await
            .map_err(write_error)?;
        sqlx::query(
            r#"
            INSERT INTO chunk_text (chunk_id, document_id, owner_id, text, metadata_json)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(chunk_id) DO UPDATE SET
                document_id = excluded.document_id,
                owner_id = excluded.owner_id,
                text = excluded.text,
                metadata_json = excluded.metadata_json
            "#,
        )
        .bind(&entry.chunk_id)
        .bind(&entry.metadata.document_id)
        .bind(&entry.metadata.owner_id)
        .bind(&entry.text)
        .bind(metadata_json)
        .execute(&mut *tx)
        .await
        .map_err(write_error)?;
        sqlx::query(
            "INSERT INTO chunks_fts (chunk_id, document_id, owner_id, text) VALUES (?, ?, ?, ?)",
        )
        .bind(&entry.chunk_id)
        .bind(&entry.metadata.document_id)
        .bind(&entry.metadata.owner_id)
        .bind(&entry.text)
        .execute(&mut *tx)
        .await
        .map_err(write_error)?;
        tx.commit().await.map_err(write_error)
    }

    async fn query(
        &self,
        owner_id: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<IndexHit>, IndexReadError> {
        let Some(expression) = QueryMatcher::new(query).as_ref().and_then(fts_expression) else {
            return Ok(Vec::new());
        };
        let limit = i64::try_from(k).unwrap_or(i64::MAX);

        let rows = sqlx::query(
            r#"
            SELECT chunks_fts.chunk_id AS chunk_id, chunk_text.text AS text,
                   chunk_text.metadata_json AS metadata_json, rank
            FROM chunks_fts
            JOIN chunk_text ON chunk_text.chunk_id = chunks_fts.chunk_id
            WHERE chunks_fts MATCH ? AND chunks_fts.owner_id = ?
            ORDER BY rank
            LIMIT ?
            "#,
        )
        .bind(expression)
        .bind(owner_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| IndexReadError::new(STORE, error.to_string()))?;

        rows.iter()
            .map(|row| {
                let rank: f64 = row.get("rank");
                let metadata_json: String = row.get("metadata_json");
                let metadata: ChunkMetadata = serde_json::from_str(&metadata_json)
                    .map_err(|error| IndexReadError::new(STORE, error.to_string()))?;
                Ok(IndexHit {
                    chunk_id: row.get("chunk_id"),
                    score: -rank as f32,
                    text: row.get("text"),
                    metadata,
                })
            })
            .collect()
    }

    async fn delete_document(&self, document_id: &str) -> Result<(), IndexWriteError> {
        let write_error = |error: sqlx::Error| IndexWriteError::new(STORE, error.to_string());
        let mut tx = self.pool.begin().await.map_err(write_error)?;
        sqlx::query("DELETE FROM chunks_fts WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await
            .map_err(write_error)?;
        sqlx::query("DELETE FROM chunk_text WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await
            .map_err(write_error)?;
        tx.commit().await.map_err(write_error)
    }
}
