//! Cascading retrieval: vector search, then keyword search, then a live scan of sources.
//!
//! The cascade is an explicit state machine:
//!
//! ```text
//! TryVector -> TryText -> TryLive -> Exhausted
//! ```
//!
//! Transitions only move forward and each tier runs only after the previous one has fully
//! returned. A tier that errors, times out, or finds nothing hands over to the next one; the
//! first tier with at least one hit answers the whole query, so a response never mixes tiers.
//! Only a failing live scan surfaces as an error, since nothing is left to fall back to.

use crate::chunking::Chunker;
use crate::corpus::{CorpusScanError, LiveCorpusScanner};
use crate::embedding::EmbeddingClient;
use crate::metrics::RetrievalMetrics;
use crate::model::{SearchResult, SourceTier, snippet};
use crate::store::{IndexReadError, QueryMatcher, Stores};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Tunables for [`CascadingRetriever`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalSettings {
    /// Minimum normalized similarity for vector hits.
    pub similarity_threshold: f32,
    /// Score assigned to every text-tier result.
    pub text_confidence: f32,
    /// Score assigned to every live-tier result.
    pub live_confidence: f32,
    /// Deadline for embedding the query plus the vector query.
    pub vector_timeout: Duration,
    /// Deadline for the keyword query.
    pub text_timeout: Duration,
    /// Deadline for the live scan.
    pub live_timeout: Duration,
    /// Maximum snippet length in characters.
    pub snippet_chars: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.3,
            text_confidence: 0.8,
            live_confidence: 0.7,
            vector_timeout: Duration::from_secs(5),
            text_timeout: Duration::from_secs(3),
            live_timeout: Duration::from_secs(15),
            snippet_chars: crate::corpus::DEFAULT_SNIPPET_CHARS,
        }
    }
}

/// Errors that reach the caller of a search.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// The live scan could not read the sources and nothing matched.
    #[error("live scan failed: {0}")]
    CorpusScan(#[from] CorpusScanError),
    /// The live scan did not finish within its deadline.
    #[error("live scan timed out after {0:?}")]
    LiveScanTimedOut(Duration),
    /// The caller abandoned the search.
    #[error("search cancelled")]
    Cancelled,
}

/// Position in the cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadeState {
    /// Semantic search over embeddings.
    TryVector,
    /// Keyword search over the text index.
    TryText,
    /// Substring scan of original sources.
    TryLive,
    /// Every tier came back empty.
    Exhausted,
}

impl CascadeState {
    /// The state after this one fails to produce results.
    pub fn next(self) -> Self {
        match self {
            Self::TryVector => Self::TryText,
            Self::TryText => Self::TryLive,
            Self::TryLive | Self::Exhausted => Self::Exhausted,
        }
    }

    /// Tier queried in this state.
    pub fn tier(self) -> Option<SourceTier> {
        match self {
            Self::TryVector => Some(SourceTier::Vector),
            Self::TryText => Some(SourceTier::Text),
            Self::TryLive => Some(SourceTier::Live),
            Self::Exhausted => None,
        }
    }
}

/// Why a tier handed over to the next one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum Fallthrough {
    /// The tier ran and matched nothing.
    Empty,
    /// The tier failed.
    Failed(String),
    /// The tier exceeded its deadline.
    TimedOut,
}

/// One tier that was tried and did not answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierAttempt {
    /// Tier that was tried.
    pub tier: SourceTier,
    /// Why it did not answer.
    pub reason: Fallthrough,
}

/// Results plus the path the cascade took to reach them.
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    /// Results, all from `answered_by`.
    pub results: Vec<SearchResult>,
    /// Tier that answered, `None` when exhausted.
    pub answered_by: Option<SourceTier>,
    /// Tiers tried before the answer, in order.
    pub fallthroughs: Vec<TierAttempt>,
}

impl SearchOutcome {
    fn answered(tier: SourceTier, results: Vec<SearchResult>, fallthroughs: Vec<TierAttempt>) -> Self {
        Self {
            results,
            answered_by: Some(tier),
            fallthroughs,
        }
    }

    fn exhausted(fallthroughs: Vec<TierAttempt>) -> Self {
        Self {
            results: Vec::new(),
            answered_by: None,
            fallthroughs,
        }
    }
}

type TierResult = Result<Vec<SearchResult>, Fallthrough>;

/// Query path over the three tiers.
pub struct CascadingRetriever {
    stores: Stores,
    embedder: Arc<dyn EmbeddingClient>,
    scanner: LiveCorpusScanner,
    settings: RetrievalSettings,
    metrics: Arc<RetrievalMetrics>,
}

impl CascadingRetriever {
    /// Wire a retriever. `chunker` must match the one used at ingestion so live hits carry
    /// the same chunk ids as the indexes.
    pub fn new(
        stores: Stores,
        embedder: Arc<dyn EmbeddingClient>,
        chunker: Chunker,
        settings: RetrievalSettings,
    ) -> Self {
        let scanner = LiveCorpusScanner::new(
            stores.documents.clone(),
            stores.corpus.clone(),
            chunker,
            settings.live_confidence,
        )
        .with_snippet_chars(settings.snippet_chars);
        Self {
            stores,
            embedder,
            scanner,
            settings,
            metrics: Arc::new(RetrievalMetrics::new()),
        }
    }

    /// Share an existing metrics accumulator.
    pub fn with_metrics(mut self, metrics: Arc<RetrievalMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Counters for this retriever.
    pub fn metrics(&self) -> &Arc<RetrievalMetrics> {
        &self.metrics
    }

    /// Up to `k` results for `query` within `owner_id`'s documents.
    pub async fn search(
        &self,
        owner_id: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<SearchResult>, RetrievalError> {
        Ok(self.search_traced(owner_id, query, k).await?.results)
    }

    /// Like [`search`](Self::search), but abandons the cascade as soon as `cancel` resolves.
    ///
    /// In-flight tier calls are dropped and nothing is recorded for a cancelled search.
    pub async fn search_with_cancel<C>(
        &self,
        owner_id: &str,
        query: &str,
        k: usize,
        cancel: C,
    ) -> Result<SearchOutcome, RetrievalError>
    where
        C: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            _ = cancel => {
                tracing::debug!(owner_id, "Search cancelled by caller");
                Err(RetrievalError::Cancelled)
            }
            outcome = self.search_traced(owner_id, query, k) => outcome,
        }
    }

    /// Run the cascade and report which tiers were tried.
    pub async fn search_traced(
        &self,
        owner_id: &str,
        query: &str,
        k: usize,
    ) -> Result<SearchOutcome, RetrievalError> {
        let outcome = self.run_cascade(owner_id, query, k).await;
        match &outcome {
            Ok(outcome) => {
                self.metrics.record_answer(outcome.answered_by);
                match outcome.answered_by {
                    Some(tier) => tracing::info!(
                        owner_id,
                        tier = %tier,
                        results = outcome.results.len(),
                        fallthroughs = outcome.fallthroughs.len(),
                        "Search answered"
                    ),
                    None => tracing::info!(owner_id, "Search exhausted every tier"),
                }
            }
            Err(error) => {
                self.metrics.record_failure();
                tracing::error!(owner_id, error = %error, "Search failed");
            }
        }
        outcome
    }

    async fn run_cascade(
        &self,
        owner_id: &str,
        query: &str,
        k: usize,
    ) -> Result<SearchOutcome, RetrievalError> {
        let mut fallthroughs = Vec::new();
        if k == 0 || query.trim().is_empty() {
            return Ok(SearchOutcome::exhausted(fallthroughs));
        }

        let mut state = CascadeState::TryVector;
        loop {
            let attempt = match state {
                CascadeState::TryVector => self.try_vector(owner_id, query, k).await,
                CascadeState::TryText => self.try_text(owner_id, query, k).await,
                CascadeState::TryLive => {
                    let results = self.try_live(owner_id, query, k).await?;
                    if results.is_empty() {
                        Err(Fallthrough::Empty)
                    } else {
                        Ok(results)
                    }
                }
                CascadeState::Exhausted => return Ok(SearchOutcome::exhausted(fallthroughs)),
            };

            let Some(tier) = state.tier() else {
                return Ok(SearchOutcome::exhausted(fallthroughs));
            };
            match attempt {
                Ok(results) => return Ok(SearchOutcome::answered(tier, results, fallthroughs)),
                Err(reason) => {
                    let next = state.next();
                    tracing::debug!(owner_id, tier = %tier, reason = ?reason, next = ?next, "Tier fell through");
                    fallthroughs.push(TierAttempt { tier, reason });
                    state = next;
                }
            }
        }
    }

    async fn try_vector(&self, owner_id: &str, query: &str, k: usize) -> TierResult {
        let lookup = async {
            let vector = self
                .embedder
                .embed(query)
                .await
                .map_err(|error| Fallthrough::Failed(error.to_string()))?;
            self.stores
                .vectors
                .query(owner_id, &vector, k, self.settings.similarity_threshold)
                .await
                .map_err(|error: IndexReadError| Fallthrough::Failed(error.to_string()))
        };

        let hits = tokio::time::timeout(self.settings.vector_timeout, lookup)
            .await
            .map_err(|_| Fallthrough::TimedOut)??;

        let results: Vec<SearchResult> = hits
            .into_iter()
            .filter(|hit| hit.score >= self.settings.similarity_threshold)
            .take(k)
            .map(|hit| SearchResult {
                snippet: snippet(&hit.text, self.settings.snippet_chars),
                chunk_id: hit.chunk_id,
                document_id: hit.metadata.document_id,
                display_name: hit.metadata.display_name,
                score: hit.score,
                source_tier: SourceTier::Vector,
            })
            .collect();
        non_empty(results)
    }

    async fn try_text(&self, owner_id: &str, query: &str, k: usize) -> TierResult {
        let hits = tokio::time::timeout(
            self.settings.text_timeout,
            self.stores.texts.query(owner_id, query, k),
        )
        .await
        .map_err(|_| Fallthrough::TimedOut)?
        .map_err(|error| Fallthrough::Failed(error.to_string()))?;

        let matcher = QueryMatcher::new(query);
        let results: Vec<SearchResult> = hits
            .into_iter()
            .take(k)
            .map(|hit| SearchResult {
                snippet: match &matcher {
                    Some(matcher) => matcher.excerpt(&hit.text, self.settings.snippet_chars),
                    None => snippet(&hit.text, self.settings.snippet_chars),
                },
                chunk_id: hit.chunk_id,
                document_id: hit.metadata.document_id,
                display_name: hit.metadata.display_name,
                score: self.settings.text_confidence,
                source_tier: SourceTier::Text,
            })
            .collect();
        non_empty(results)
    }

    async fn try_live(
        &self,
        owner_id: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<SearchResult>, RetrievalError> {
        tokio::time::timeout(self.settings.live_timeout, self.scanner.scan(owner_id, query, k))
            .await
            .map_err(|_| RetrievalError::LiveScanTimedOut(self.settings.live_timeout))?
            .map_err(RetrievalError::from)
    }
}

fn non_empty(results: Vec<SearchResult>) -> TierResult {
    if results.is_empty() {
        Err(Fallthrough::Empty)
    } else {
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_only_move_forward() {
        let mut state = CascadeState::TryVector;
        let mut visited = vec![state];
        while state != CascadeState::Exhausted {
            state = state.next();
            visited.push(state);
        }
        assert_eq!(
            visited,
            [
                CascadeState::TryVector,
                CascadeState::TryText,
                CascadeState::TryLive,
                CascadeState::Exhausted
            ]
        );
        assert_eq!(CascadeState::Exhausted.next(), CascadeState::Exhausted);
        assert_eq!(CascadeState::Exhausted.tier(), None);
    }

    #[test]
    fn fallthrough_serializes_with_reason() {
        let value = serde_json::to_value(TierAttempt {
            tier: SourceTier::Vector,
            reason: Fallthrough::Failed("provider down".into()),
        })
        .expect("serialize");
        assert_eq!(value["tier"], "vector");
        assert_eq!(value["reason"]["outcome"], "failed");
        assert_eq!(value["reason"]["detail"], "provider down");
    }
}
