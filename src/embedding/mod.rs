//! Embedding capability and adapters.
//!
//! - [`HashingEmbeddingClient`]: deterministic, offline bag-of-words feature hashing. Useful for
//!   local runs and tests; similarity tracks shared vocabulary.
//! - [`OllamaEmbeddingClient`]: calls a local Ollama runtime's `/api/embed` endpoint.

mod ollama;

pub use ollama::{DEFAULT_OLLAMA_URL, OllamaEmbeddingClient};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Provider could not be reached.
    #[error("Embedding provider unavailable: {0}")]
    Unavailable(String),
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
    /// Provider response could not be decoded.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
    /// Returned vector length differs from the declared dimension.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension declared by the client.
        expected: usize,
        /// Dimension actually returned.
        actual: usize,
    },
    /// Call did not complete within its deadline.
    #[error("Embedding request timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Dimensionality of every vector this client produces.
    fn dimension(&self) -> usize;

    /// Produce an embedding vector for each supplied text, in input order.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;

    /// Embed a single text, enforcing the declared dimension.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingClientError> {
        let mut vectors = self.generate_embeddings(vec![text.to_string()]).await?;
        let vector = vectors.pop().ok_or_else(|| {
            EmbeddingClientError::InvalidResponse("provider returned no vectors".into())
        })?;
        let expected = self.dimension();
        if vector.len() != expected {
            return Err(EmbeddingClientError::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }
        Ok(vector)
    }
}

/// Deterministic embedding client that hashes lowercase word features into a fixed number of
/// buckets and L2-normalizes the result.
#[derive(Debug, Clone)]
pub struct HashingEmbeddingClient {
    dimension: usize,
}

impl HashingEmbeddingClient {
    /// Construct a client producing `dimension`-sized vectors.
    pub const fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn encode(text: &str, dimension: usize) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; dimension];

        for word in text.split_whitespace() {
            let feature: String = word
                .chars()
                .filter(|c| c.is_alphanumeric())
                .flat_map(char::to_lowercase)
                .collect();
            if feature.is_empty() {
                continue;
            }
            let digest = Sha256::digest(feature.as_bytes());
            let bucket = u64::from_le_bytes([
                digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6],
                digest[7],
            ]) as usize
                % dimension;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            embedding[bucket] += sign;
        }

        let norm = embedding
            .iter()
            .map(|value| value * value)
            .sum::<f32>()
            .sqrt();

        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }

        embedding
    }
}

#[async_trait]
impl EmbeddingClient for HashingEmbeddingClient {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if self.dimension == 0 {
            return Err(EmbeddingClientError::GenerationFailed(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }

        if texts.is_empty() {
            return Err(EmbeddingClientError::GenerationFailed(
                "no texts provided".to_string(),
            ));
        }

        tracing::trace!(
            dimension = self.dimension,
            texts = texts.len(),
            "Generating hashed embeddings"
        );

        Ok(texts
            .iter()
            .map(|text| Self::encode(text, self.dimension))
            .collect())
    }
}

/// Cosine similarity between two vectors; `0.0` for empty or mismatched inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Clamp a cosine similarity into `[0, 1]`; opposed vectors count as unrelated.
pub fn normalize_similarity(cosine: f32) -> f32 {
    if cosine.is_nan() {
        return 0.0;
    }
    cosine.clamp(0.0, 1.0)
}
