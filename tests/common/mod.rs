#![allow(dead_code)]

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use docsift::chunking::{Chunker, ChunkerSettings};
use docsift::embedding::{EmbeddingClient, EmbeddingClientError, HashingEmbeddingClient};
use docsift::model::{IndexEntry, IndexHit, TextEntry};
use docsift::pipeline::{IndexingPipeline, PipelineSettings};
use docsift::purge::Purger;
use docsift::retrieval::{CascadingRetriever, RetrievalSettings};
use docsift::retry::RetryPolicy;
use docsift::store::{
    InMemoryTextIndex, InMemoryVectorIndex, IndexReadError, IndexWriteError, Stores, TextIndex,
    VectorIndex,
};

pub const DIMENSION: usize = 64;

/// Hashing embedder that can be switched into an outage or made slow.
#[derive(Default)]
pub struct ControlledEmbedder {
    failing: AtomicBool,
    delay: Mutex<Option<Duration>>,
}

impl ControlledEmbedder {
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().expect("delay lock") = delay;
    }
}

#[async_trait]
impl EmbeddingClient for ControlledEmbedder {
    fn dimension(&self) -> usize {
        DIMENSION
    }

    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        let delay = *self.delay.lock().expect("delay lock");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(EmbeddingClientError::Unavailable(
                "simulated provider outage".into(),
            ));
        }
        HashingEmbeddingClient::new(DIMENSION)
            .generate_embeddings(texts)
            .await
    }
}

/// Switches shared by the controlled index doubles.
#[derive(Default)]
pub struct Faults {
    pub failing_writes: AtomicBool,
    pub transient_write_failures: AtomicU32,
    pub failing_reads: AtomicBool,
    pub failing_deletes: AtomicBool,
    pub read_delay: Mutex<Option<Duration>>,
}

impl Faults {
    fn write(&self, store: &'static str) -> Result<(), IndexWriteError> {
        if self.failing_writes.load(Ordering::SeqCst) {
            return Err(IndexWriteError::new(store, "simulated write failure"));
        }
        let transient = self
            .transient_write_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1));
        if transient.is_ok() {
            return Err(IndexWriteError::new(store, "simulated transient failure"));
        }
        Ok(())
    }

    async fn read(&self, store: &'static str) -> Result<(), IndexReadError> {
        let delay = *self.read_delay.lock().expect("delay lock");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_reads.load(Ordering::SeqCst) {
            return Err(IndexReadError::new(store, "simulated outage"));
        }
        Ok(())
    }

    fn delete(&self, store: &'static str) -> Result<(), IndexWriteError> {
        if self.failing_deletes.load(Ordering::SeqCst) {
            return Err(IndexWriteError::new(store, "simulated delete failure"));
        }
        Ok(())
    }

    pub fn set_read_delay(&self, delay: Option<Duration>) {
        *self.read_delay.lock().expect("delay lock") = delay;
    }
}

#[derive(Default)]
pub struct ControlledVectorIndex {
    pub inner: InMemoryVectorIndex,
    pub faults: Faults,
}

#[async_trait]
impl VectorIndex for ControlledVectorIndex {
    async fn upsert(&self, entry: IndexEntry) -> Result<(), IndexWriteError> {
        self.faults.write("vector-fake")?;
        self.inner.upsert(entry).await
    }

    async fn query(
        &self,
        owner_id: &str,
        vector: &[f32],
        k: usize,
        threshold: f32,
    ) -> Result<Vec<IndexHit>, IndexReadError> {
        self.faults.read("vector-fake").await?;
        self.inner.query(owner_id, vector, k, threshold).await
    }

    async fn delete_document(&self, document_id: &str) -> Result<(), IndexWriteError> {
        self.faults.delete("vector-fake")?;
        self.inner.delete_document(document_id).await
    }
}

#[derive(Default)]
pub struct ControlledTextIndex {
    pub inner: InMemoryTextIndex,
    pub faults: Faults,
}

#[async_trait]
impl TextIndex for ControlledTextIndex {
    async fn upsert(&self, entry: TextEntry) -> Result<(), IndexWriteError> {
        self.faults.write("text-fake")?;
        self.inner.upsert(entry).await
    }

    async fn query(
        &self,
        owner_id: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<IndexHit>, IndexReadError> {
        self.faults.read("text-fake").await?;
        self.inner.query(owner_id, query, k).await
    }

    async fn delete_document(&self, document_id: &str) -> Result<(), IndexWriteError> {
        self.faults.delete("text-fake")?;
        self.inner.delete_document(document_id).await
    }
}

/// Pipeline, retriever, and purger over in-memory stores with controllable faults.
pub struct Harness {
    pub stores: Stores,
    pub embedder: Arc<ControlledEmbedder>,
    pub vectors: Arc<ControlledVectorIndex>,
    pub texts: Arc<ControlledTextIndex>,
    pub pipeline: IndexingPipeline,
    pub retriever: CascadingRetriever,
    pub purger: Purger,
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        attempts: 3,
        base_delay: Duration::from_millis(1),
    }
}

pub fn chunker() -> Chunker {
    Chunker::new(ChunkerSettings::default()).expect("chunker")
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(RetrievalSettings {
            similarity_threshold: 0.1,
            ..RetrievalSettings::default()
        })
    }

    pub fn with_settings(retrieval: RetrievalSettings) -> Self {
        Self::with_stores(Stores::in_memory(), retrieval)
    }

    pub fn with_stores(base: Stores, retrieval: RetrievalSettings) -> Self {
        let embedder = Arc::new(ControlledEmbedder::default());
        let vectors = Arc::new(ControlledVectorIndex::default());
        let texts = Arc::new(ControlledTextIndex::default());
        let stores = Stores {
            vectors: vectors.clone(),
            texts: texts.clone(),
            ..base
        };
        let pipeline = IndexingPipeline::new(
            stores.clone(),
            embedder.clone(),
            chunker(),
            PipelineSettings {
                write_retry: fast_retry(),
                ..PipelineSettings::default()
            },
        );
        let retriever = CascadingRetriever::new(stores.clone(), embedder.clone(), chunker(), retrieval);
        let purger = Purger::new(stores.clone(), fast_retry());
        Self {
            stores,
            embedder,
            vectors,
            texts,
            pipeline,
            retriever,
            purger,
        }
    }
}

/// `count` distinct words, `w0 w1 ...`.
pub fn words(count: usize) -> String {
    (0..count)
        .map(|index| format!("w{index}"))
        .collect::<Vec<_>>()
        .join(" ")
}
