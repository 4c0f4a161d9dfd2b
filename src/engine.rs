//! Wiring from [`Config`] to a ready-to-use ingestion pipeline, retriever, and purger.

use crate::chunking::{Chunker, ChunkingError};
use crate::config::{Config, EmbeddingProvider, VectorStoreKind};
use crate::corpus::FsCorpus;
use crate::embedding::{EmbeddingClient, EmbeddingClientError, HashingEmbeddingClient, OllamaEmbeddingClient};
use crate::pipeline::IndexingPipeline;
use crate::purge::Purger;
use crate::qdrant::{QdrantError, QdrantService, QdrantVectorIndex};
use crate::retrieval::CascadingRetriever;
use crate::sqlite::SqliteStore;
use crate::store::{InMemoryVectorIndex, Stores, VectorIndex};
use std::sync::Arc;
use thiserror::Error;

/// Failures while assembling the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Chunk window settings are unusable.
    #[error(transparent)]
    Chunking(#[from] ChunkingError),
    /// The SQLite database could not be opened or migrated.
    #[error("failed to open SQLite store: {0}")]
    Sqlite(#[from] sqlx::Error),
    /// Qdrant could not be reached or prepared.
    #[error("failed to prepare Qdrant: {0}")]
    Qdrant(#[from] QdrantError),
    /// The embedding client could not be built.
    #[error(transparent)]
    Embedding(#[from] EmbeddingClientError),
    /// The Qdrant backend was selected without a URL.
    #[error("QDRANT_URL is required when VECTOR_STORE=qdrant")]
    MissingQdrantUrl,
}

/// Ingestion, retrieval, and purge over one set of stores.
pub struct Engine {
    /// Ingestion path.
    pub pipeline: IndexingPipeline,
    /// Query path.
    pub retriever: CascadingRetriever,
    /// Deletion path.
    pub purger: Purger,
    sqlite: SqliteStore,
}

impl Engine {
    /// Open every backend named by `config`.
    pub async fn open(config: &Config) -> Result<Self, EngineError> {
        let chunker = Chunker::new(config.chunker_settings())?;
        let embedder = build_embedder(config)?;
        let vectors = build_vector_index(config).await?;
        let sqlite = SqliteStore::open(&config.sqlite_path()).await?;

        let stores = Stores {
            documents: Arc::new(sqlite.clone()),
            corpus: Arc::new(FsCorpus::new(config.corpus_root())),
            vectors,
            texts: Arc::new(sqlite.clone()),
        };

        tracing::info!(
            data_dir = %config.data_dir.display(),
            vector_store = ?config.vector_store,
            embedding_provider = ?config.embedding_provider,
            "Engine ready"
        );
        Ok(Self::from_parts(stores, embedder, chunker, config, sqlite))
    }

    fn from_parts(
        stores: Stores,
        embedder: Arc<dyn EmbeddingClient>,
        chunker: Chunker,
        config: &Config,
        sqlite: SqliteStore,
    ) -> Self {
        let pipeline = IndexingPipeline::new(
            stores.clone(),
            embedder.clone(),
            chunker.clone(),
            config.pipeline_settings(),
        );
        let retriever =
            CascadingRetriever::new(stores.clone(), embedder, chunker, config.retrieval_settings());
        let purger = Purger::new(stores, config.retry_policy());
        Self {
            pipeline,
            retriever,
            purger,
            sqlite,
        }
    }

    /// Flush and close the SQLite pool.
    pub async fn close(&self) {
        self.sqlite.close().await;
    }
}

fn build_embedder(config: &Config) -> Result<Arc<dyn EmbeddingClient>, EngineError> {
    Ok(match config.embedding_provider {
        EmbeddingProvider::Hashing => {
            Arc::new(HashingEmbeddingClient::new(config.embedding_dimension))
        }
        EmbeddingProvider::Ollama => Arc::new(OllamaEmbeddingClient::new(
            config.ollama_url.clone(),
            config.embedding_model.clone(),
            config.embedding_dimension,
            config.embed_timeout,
        )?),
    })
}

async fn build_vector_index(config: &Config) -> Result<Arc<dyn VectorIndex>, EngineError> {
    match config.vector_store {
        VectorStoreKind::Memory => {
            tracing::warn!("Using in-memory vector index; embeddings are lost on exit");
            Ok(Arc::new(InMemoryVectorIndex::new()))
        }
        VectorStoreKind::Qdrant => {
            let url = config
                .qdrant_url
                .as_deref()
                .ok_or(EngineError::MissingQdrantUrl)?;
            let service = QdrantService::new(url, config.qdrant_api_key.clone())?;
            let index = QdrantVectorIndex::connect(
                service,
                config.qdrant_collection_name.clone(),
                config.embedding_dimension,
            )
            .await?;
            Ok(Arc::new(index))
        }
    }
}
