use crate::chunking::{ChunkerSettings, DEFAULT_WINDOW_WORDS};
use crate::embedding::DEFAULT_OLLAMA_URL;
use crate::pipeline::PipelineSettings;
use crate::retrieval::RetrievalSettings;
use crate::retry::RetryPolicy;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed or failed validation.
    #[error("Invalid value for environment variable {key}: {reason}")]
    InvalidValue {
        /// Offending variable.
        key: String,
        /// What was wrong with it.
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

/// Backend holding chunk embeddings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VectorStoreKind {
    /// Qdrant over its REST API.
    Qdrant,
    /// Process-local index; contents are lost on exit.
    Memory,
}

impl FromStr for VectorStoreKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "qdrant" => Ok(Self::Qdrant),
            "memory" => Ok(Self::Memory),
            _ => Err(()),
        }
    }
}

/// Supported embedding backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmbeddingProvider {
    /// Deterministic offline feature hashing.
    Hashing,
    /// Local Ollama runtime.
    Ollama,
}

impl FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hashing" => Ok(Self::Hashing),
            "ollama" => Ok(Self::Ollama),
            _ => Err(()),
        }
    }
}

/// Runtime configuration for the docsift engine.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the SQLite database and the corpus tree.
    pub data_dir: PathBuf,
    /// Backend used for chunk embeddings.
    pub vector_store: VectorStoreKind,
    /// Base URL of the Qdrant instance; required for the Qdrant backend.
    pub qdrant_url: Option<String>,
    /// Qdrant collection holding chunk embeddings.
    pub qdrant_collection_name: String,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Embedding provider used for chunks and queries.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Base URL of the Ollama runtime.
    pub ollama_url: String,
    /// Words per chunk.
    pub chunk_window_words: usize,
    /// Words shared by consecutive chunks.
    pub chunk_overlap_words: usize,
    /// Minimum normalized similarity for vector hits.
    pub vector_similarity_threshold: f32,
    /// Minimum filename similarity reported as a near-duplicate.
    pub filename_similarity_threshold: f64,
    /// Score assigned to text-tier results.
    pub text_tier_confidence: f32,
    /// Score assigned to live-tier results.
    pub live_tier_confidence: f32,
    /// Vector tier deadline.
    pub vector_tier_timeout: Duration,
    /// Text tier deadline.
    pub text_tier_timeout: Duration,
    /// Live tier deadline.
    pub live_tier_timeout: Duration,
    /// Per-chunk embedding deadline during ingestion.
    pub embed_timeout: Duration,
    /// Chunks embedded concurrently per document.
    pub embed_concurrency: usize,
    /// Retries after a failed index write.
    pub index_write_retries: u32,
    /// Delay before the first retry.
    pub index_retry_base_delay: Duration,
    /// Result count when a search does not specify one.
    pub search_default_limit: usize,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);
        let retrieval_defaults = RetrievalSettings::default();
        let pipeline_defaults = PipelineSettings::default();
        let retry_defaults = RetryPolicy::default();

        let vector_store = vars
            .optional("VECTOR_STORE")
            .map(|value| {
                value
                    .parse()
                    .map_err(|()| ConfigError::invalid("VECTOR_STORE", "expected qdrant or memory"))
            })
            .transpose()?
            .unwrap_or(VectorStoreKind::Qdrant);
        let qdrant_url = vars.optional("QDRANT_URL");
        if vector_store == VectorStoreKind::Qdrant && qdrant_url.is_none() {
            return Err(ConfigError::MissingVariable("QDRANT_URL".to_string()));
        }

        let config = Self {
            data_dir: vars
                .optional("DOCSIFT_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data")),
            vector_store,
            qdrant_url,
            qdrant_collection_name: vars
                .optional("QDRANT_COLLECTION_NAME")
                .unwrap_or_else(|| "docsift".to_string()),
            qdrant_api_key: vars.optional("QDRANT_API_KEY"),
            embedding_provider: vars
                .optional("EMBEDDING_PROVIDER")
                .map(|value| {
                    value.parse().map_err(|()| {
                        ConfigError::invalid("EMBEDDING_PROVIDER", "expected hashing or ollama")
                    })
                })
                .transpose()?
                .unwrap_or(EmbeddingProvider::Hashing),
            embedding_model: vars
                .optional("EMBEDDING_MODEL")
                .unwrap_or_else(|| "nomic-embed-text".to_string()),
            embedding_dimension: vars.parsed("EMBEDDING_DIMENSION", 768)?,
            ollama_url: vars
                .optional("OLLAMA_URL")
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            chunk_window_words: vars.parsed("CHUNK_WINDOW_WORDS", DEFAULT_WINDOW_WORDS)?,
            chunk_overlap_words: vars.parsed("CHUNK_OVERLAP_WORDS", 0)?,
            vector_similarity_threshold: vars.parsed(
                "VECTOR_SIMILARITY_THRESHOLD",
                retrieval_defaults.similarity_threshold,
            )?,
            filename_similarity_threshold: vars.parsed(
                "FILENAME_SIMILARITY_THRESHOLD",
                pipeline_defaults.filename_similarity_threshold,
            )?,
            text_tier_confidence: vars
                .parsed("TEXT_TIER_CONFIDENCE", retrieval_defaults.text_confidence)?,
            live_tier_confidence: vars
                .parsed("LIVE_TIER_CONFIDENCE", retrieval_defaults.live_confidence)?,
            vector_tier_timeout: vars
                .millis("VECTOR_TIER_TIMEOUT_MS", retrieval_defaults.vector_timeout)?,
            text_tier_timeout: vars.millis("TEXT_TIER_TIMEOUT_MS", retrieval_defaults.text_timeout)?,
            live_tier_timeout: vars.millis("LIVE_TIER_TIMEOUT_MS", retrieval_defaults.live_timeout)?,
            embed_timeout: vars.millis("EMBED_TIMEOUT_MS", pipeline_defaults.embed_timeout)?,
            embed_concurrency: vars
                .parsed("EMBED_CONCURRENCY", pipeline_defaults.embed_concurrency)?,
            index_write_retries: vars
                .parsed("INDEX_WRITE_RETRIES", retry_defaults.attempts.saturating_sub(1))?,
            index_retry_base_delay: vars
                .millis("INDEX_RETRY_BASE_DELAY_MS", retry_defaults.base_delay)?,
            search_default_limit: vars.parsed("SEARCH_DEFAULT_LIMIT", 5)?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_window_words == 0 {
            return Err(ConfigError::invalid("CHUNK_WINDOW_WORDS", "must be positive"));
        }
        if self.chunk_overlap_words >= self.chunk_window_words {
            return Err(ConfigError::invalid(
                "CHUNK_OVERLAP_WORDS",
                "must be smaller than CHUNK_WINDOW_WORDS",
            ));
        }
        if self.embedding_dimension == 0 {
            return Err(ConfigError::invalid("EMBEDDING_DIMENSION", "must be positive"));
        }
        if self.embed_concurrency == 0 {
            return Err(ConfigError::invalid("EMBED_CONCURRENCY", "must be positive"));
        }
        for (key, value) in [
            ("VECTOR_SIMILARITY_THRESHOLD", self.vector_similarity_threshold as f64),
            ("FILENAME_SIMILARITY_THRESHOLD", self.filename_similarity_threshold),
            ("TEXT_TIER_CONFIDENCE", self.text_tier_confidence as f64),
            ("LIVE_TIER_CONFIDENCE", self.live_tier_confidence as f64),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::invalid(key, "must be within [0, 1]"));
            }
        }
        if self.text_tier_confidence <= self.live_tier_confidence {
            return Err(ConfigError::invalid(
                "TEXT_TIER_CONFIDENCE",
                "must be greater than LIVE_TIER_CONFIDENCE",
            ));
        }
        Ok(())
    }

    /// SQLite database holding document records and the keyword index.
    pub fn sqlite_path(&self) -> PathBuf {
        self.data_dir.join("docsift.db")
    }

    /// Root of the stored source texts.
    pub fn corpus_root(&self) -> PathBuf {
        self.data_dir.join("corpus")
    }

    /// Chunk window settings.
    pub fn chunker_settings(&self) -> ChunkerSettings {
        ChunkerSettings {
            window_words: self.chunk_window_words,
            overlap_words: self.chunk_overlap_words,
        }
    }

    /// Retry policy for index writes and purges.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.index_write_retries.saturating_add(1),
            base_delay: self.index_retry_base_delay,
        }
    }

    /// Ingestion settings.
    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            embed_timeout: self.embed_timeout,
            embed_concurrency: self.embed_concurrency,
            write_retry: self.retry_policy(),
            filename_similarity_threshold: self.filename_similarity_threshold,
        }
    }

    /// Retrieval settings.
    pub fn retrieval_settings(&self) -> RetrievalSettings {
        RetrievalSettings {
            similarity_threshold: self.vector_similarity_threshold,
            text_confidence: self.text_tier_confidence,
            live_confidence: self.live_tier_confidence,
            vector_timeout: self.vector_tier_timeout,
            text_timeout: self.text_tier_timeout,
            live_timeout: self.live_tier_timeout,
            ..RetrievalSettings::default()
        }
    }
}

struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|value| !value.trim().is_empty())
    }

    fn parsed<T: FromStr>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        match self.optional(key) {
            Some(value) => value
                .trim()
                .parse()
                .map_err(|_| ConfigError::invalid(key, format!("could not parse {value:?}"))),
            None => Ok(default),
        }
    }

    fn millis(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        match self.optional(key) {
            Some(_) => Ok(Duration::from_millis(self.parsed(key, 0u64)?)),
            None => Ok(default),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, if [`init_config`] has run.
pub fn get_config() -> Option<&'static Config> {
    CONFIG.get()
}

/// Load configuration from `.env` and the environment and install it in the global cache.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    if let Some(config) = CONFIG.get() {
        return Ok(config);
    }
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    tracing::debug!(
        data_dir = %config.data_dir.display(),
        vector_store = ?config.vector_store,
        qdrant_url = ?config.qdrant_url,
        collection = %config.qdrant_collection_name,
        embedding_provider = ?config.embedding_provider,
        embedding_dimension = config.embedding_dimension,
        "Loaded configuration"
    );
    Ok(CONFIG.get_or_init(|| config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_with_memory_store() {
        let config = load(&[("VECTOR_STORE", "memory")]).expect("config");
        assert_eq!(config.vector_store, VectorStoreKind::Memory);
        assert_eq!(config.embedding_provider, EmbeddingProvider::Hashing);
        assert_eq!(config.chunk_window_words, 200);
        assert_eq!(config.search_default_limit, 5);
        assert_eq!(config.retry_policy().attempts, 4);
        assert_eq!(config.index_write_retries, 3);
        assert_eq!(config.retrieval_settings(), RetrievalSettings::default());
        assert_eq!(config.sqlite_path(), PathBuf::from("data/docsift.db"));
    }

    #[test]
    fn qdrant_requires_url() {
        let error = load(&[]).expect_err("missing url");
        assert!(matches!(error, ConfigError::MissingVariable(key) if key == "QDRANT_URL"));

        let config = load(&[("QDRANT_URL", "http://localhost:6333")]).expect("config");
        assert_eq!(config.qdrant_url.as_deref(), Some("http://localhost:6333"));
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config = load(&[("VECTOR_STORE", "memory"), ("CHUNK_WINDOW_WORDS", "  ")])
            .expect("config");
        assert_eq!(config.chunk_window_words, 200);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = load(&[
            ("VECTOR_STORE", "memory"),
            ("EMBEDDING_PROVIDER", "Ollama"),
            ("CHUNK_WINDOW_WORDS", "100"),
            ("CHUNK_OVERLAP_WORDS", "20"),
            ("VECTOR_TIER_TIMEOUT_MS", "250"),
            ("INDEX_WRITE_RETRIES", "0"),
        ])
        .expect("config");
        assert_eq!(config.embedding_provider, EmbeddingProvider::Ollama);
        assert_eq!(config.chunker_settings().stride(), 80);
        assert_eq!(config.vector_tier_timeout, Duration::from_millis(250));
        assert_eq!(config.retry_policy().attempts, 1);
    }

    #[test]
    fn invalid_values_are_rejected() {
        for pairs in [
            &[("VECTOR_STORE", "memory"), ("CHUNK_WINDOW_WORDS", "ten")][..],
            &[("VECTOR_STORE", "memory"), ("CHUNK_OVERLAP_WORDS", "200")][..],
            &[("VECTOR_STORE", "memory"), ("VECTOR_SIMILARITY_THRESHOLD", "1.5")][..],
            &[("VECTOR_STORE", "memory"), ("LIVE_TIER_CONFIDENCE", "0.9")][..],
            &[("VECTOR_STORE", "elastic")][..],
        ] {
            let error = load(pairs).expect_err("invalid config");
            assert!(matches!(error, ConfigError::InvalidValue { .. }), "{pairs:?}");
        }
    }
}
