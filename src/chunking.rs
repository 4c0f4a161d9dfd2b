//! Fixed-size word-window chunking.
//!
//! Text is tokenized on whitespace and covered by windows of `window_words` words. Consecutive
//! windows start `stride = window_words - overlap_words` words apart, so `overlap_words = 0`
//! yields disjoint windows and any positive overlap repeats that many words at each boundary
//! (overlap ratio `overlap_words / window_words`). Highlights:
//!
//! - Deterministic identity: chunk ids are UUIDv5 over `"{document_id}:{ordinal}"`, so
//!   re-chunking unchanged text reproduces the same ids and index upserts stay idempotent.
//! - No content loss: every word belongs to at least one window; a short trailing window is
//!   emitted as its own final chunk rather than dropped or merged.
//! - Empty or whitespace-only text produces zero chunks.
//! - Token estimates prefer the `cl100k_base` encoding from `tiktoken-rs` and fall back to a
//!   words-based heuristic when the encoding cannot be loaded.

use crate::model::Chunk;
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tiktoken_rs::{CoreBPE, cl100k_base};
use uuid::Uuid;

type TokenCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;

/// Namespace for chunk UUIDv5 identifiers.
const CHUNK_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a9e_53d4_4b7a_9c1e_0d8b_7f3a_2e51);

/// Default window size in words.
pub const DEFAULT_WINDOW_WORDS: usize = 200;

/// Errors raised for impossible chunker settings.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkingError {
    /// A window must hold at least one word.
    #[error("chunk window must be greater than zero")]
    InvalidWindow,
    /// Overlap must leave a positive stride.
    #[error("chunk overlap ({overlap}) must be smaller than the window ({window})")]
    OverlapTooLarge {
        /// Configured overlap in words.
        overlap: usize,
        /// Configured window in words.
        window: usize,
    },
}

/// Window configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkerSettings {
    /// Maximum words per chunk.
    pub window_words: usize,
    /// Words repeated between consecutive chunks.
    pub overlap_words: usize,
}

impl Default for ChunkerSettings {
    fn default() -> Self {
        Self {
            window_words: DEFAULT_WINDOW_WORDS,
            overlap_words: 0,
        }
    }
}

impl ChunkerSettings {
    /// Distance in words between consecutive window starts.
    pub fn stride(&self) -> usize {
        self.window_words - self.overlap_words
    }

    fn validate(&self) -> Result<(), ChunkingError> {
        if self.window_words == 0 {
            return Err(ChunkingError::InvalidWindow);
        }
        if self.overlap_words >= self.window_words {
            return Err(ChunkingError::OverlapTooLarge {
                overlap: self.overlap_words,
                window: self.window_words,
            });
        }
        Ok(())
    }
}

/// Splits extracted text into [`Chunk`]s.
#[derive(Clone)]
pub struct Chunker {
    settings: ChunkerSettings,
    token_counter: TokenCounter,
}

impl std::fmt::Debug for Chunker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chunker")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Chunker {
    /// Build a chunker, validating the window settings.
    pub fn new(settings: ChunkerSettings) -> Result<Self, ChunkingError> {
        settings.validate()?;
        Ok(Self {
            settings,
            token_counter: build_token_counter(),
        })
    }

    /// Active settings.
    pub fn settings(&self) -> ChunkerSettings {
        self.settings
    }

    /// Split `text` into ordered chunks belonging to `document_id`.
    pub fn split(&self, document_id: &str, text: &str) -> Vec<Chunk> {
        let words: Vec<&str> = text.split_whitespace().collect();
        if words.is_empty() {
            return Vec::new();
        }

        let window = self.settings.window_words;
        let stride = self.settings.stride();
        let mut chunks = Vec::with_capacity(self.chunk_count(words.len()));
        let mut start = 0;

        while start < words.len() {
            let end = (start + window).min(words.len());
            let ordinal = start / stride;
            let text = words[start..end].join(" ");
            let token_estimate = (self.token_counter)(&text);
            chunks.push(Chunk {
                id: chunk_id(document_id, ordinal),
                document_id: document_id.to_string(),
                ordinal,
                text,
                start_word: start,
                word_count: end - start,
                token_estimate,
            });
            if end == words.len() {
                break;
            }
            start += stride;
        }

        chunks
    }

    /// Number of chunks [`split`](Self::split) produces for `total_words` words.
    pub fn chunk_count(&self, total_words: usize) -> usize {
        let window = self.settings.window_words;
        if total_words == 0 {
            0
        } else if total_words <= window {
            1
        } else {
            1 + (total_words - window).div_ceil(self.settings.stride())
        }
    }
}

/// Deterministic chunk identifier for `(document_id, ordinal)`.
pub fn chunk_id(document_id: &str, ordinal: usize) -> String {
    Uuid::new_v5(
        &CHUNK_NAMESPACE,
        format!("{document_id}:{ordinal}").as_bytes(),
    )
    .to_string()
}

fn build_token_counter() -> TokenCounter {
    static ENCODING: OnceLock<Option<Arc<CoreBPE>>> = OnceLock::new();
    let encoding = ENCODING.get_or_init(|| match cl100k_base() {
        Ok(bpe) => Some(Arc::new(bpe)),
        Err(error) => {
            tracing::warn!(error = %error, "Tokenizer unavailable; estimating tokens from word counts");
            None
        }
    });

    match encoding.clone() {
        Some(bpe) => Arc::new(move |text: &str| bpe.encode_ordinary(text).len()),
        None => Arc::new(estimate_tokens_from_words),
    }
}

fn estimate_tokens_from_words(text: &str) -> usize {
    // Roughly four tokens per three English words.
    (text.split_whitespace().count() * 4).div_ceil(3)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn chunker(window_words: usize, overlap_words: usize) -> Chunker {
        Chunker::new(ChunkerSettings {
            window_words,
            overlap_words,
        })
        .expect("valid settings")
    }

    fn numbered_words(count: usize) -> String {
        (0..count)
            .map(|i| format!("w{i}"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn thousand_words_yield_five_chunks() {
        let chunks = chunker(200, 0).split("doc-1", &numbered_words(1000));
        assert_eq!(chunks.len(), 5);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.ordinal, i);
            assert_eq!(chunk.word_count, 200);
            assert_eq!(chunk.text.split_whitespace().count(), 200);
        }
    }

    #[test]
    fn trailing_partial_window_is_its_own_chunk() {
        let chunks = chunker(200, 0).split("doc-1", &numbered_words(405));
        assert_eq!(chunks.len(), 3);
        let last = chunks.last().expect("last chunk");
        assert_eq!(last.ordinal, 2);
        assert_eq!(last.word_count, 5);
        assert_eq!(last.text, "w400 w401 w402 w403 w404");
    }

    #[test]
    fn empty_and_blank_text_produce_no_chunks() {
        let chunker = chunker(200, 0);
        assert!(chunker.split("doc-1", "").is_empty());
        assert!(chunker.split("doc-1", " \n\t ").is_empty());
    }

    #[test]
    fn overlap_repeats_boundary_words() {
        let chunks = chunker(4, 2).split("doc-1", &numbered_words(8));
        let texts: Vec<&str> = chunks.iter().map(|chunk| chunk.text.as_str()).collect();
        assert_eq!(
            texts,
            vec!["w0 w1 w2 w3", "w2 w3 w4 w5", "w4 w5 w6 w7"]
        );
        assert_eq!(chunks[2].ordinal, 2);
    }

    #[test]
    fn chunk_ids_are_deterministic_per_document_and_ordinal() {
        let text = numbered_words(450);
        let first = chunker(200, 0).split("doc-1", &text);
        let second = chunker(200, 0).split("doc-1", &text);
        assert_eq!(first, second);
        let other = chunker(200, 0).split("doc-2", &text);
        assert_ne!(first[0].id, other[0].id);
        assert_eq!(first[1].id, chunk_id("doc-1", 1));
        assert!(Uuid::parse_str(&first[0].id).is_ok());
    }

    #[test]
    fn rejects_invalid_settings() {
        assert_eq!(
            Chunker::new(ChunkerSettings {
                window_words: 0,
                overlap_words: 0
            })
            .unwrap_err(),
            ChunkingError::InvalidWindow
        );
        assert!(matches!(
            Chunker::new(ChunkerSettings {
                window_words: 10,
                overlap_words: 10
            }),
            Err(ChunkingError::OverlapTooLarge { .. })
        ));
    }

    #[test]
    fn token_estimate_is_positive_for_text() {
        let chunks = chunker(10, 0).split("doc-1", "refund policy for annual plans");
        assert!(chunks[0].token_estimate >= 5);
    }

    proptest! {
        #[test]
        fn every_word_is_covered(
            word_count in 0usize..700,
            window in 1usize..60,
            overlap_seed in 0usize..60,
        ) {
            let overlap = overlap_seed % window;
            let chunker = chunker(window, overlap);
            let chunks = chunker.split("doc-p", &numbered_words(word_count));
            prop_assert_eq!(chunks.len(), chunker.chunk_count(word_count));

            let mut covered = vec![false; word_count];
            for (i, chunk) in chunks.iter().enumerate() {
                prop_assert_eq!(chunk.ordinal, i);
                prop_assert!(chunk.word_count <= window);
                prop_assert!(chunk.word_count > 0);
                for (offset, word) in chunk.text.split_whitespace().enumerate() {
                    let index = chunk.start_word + offset;
                    prop_assert_eq!(word, format!("w{index}"));
                    covered[index] = true;
                }
            }
            prop_assert!(covered.iter().all(|seen| *seen));
        }

        #[test]
        fn identity_is_reproducible(text in "[a-z ]{0,400}") {
            let chunker = chunker(7, 2);
            let first: Vec<(usize, String)> = chunker
                .split("doc-p", &text)
                .into_iter()
                .map(|chunk| (chunk.ordinal, chunk.id))
                .collect();
            let second: Vec<(usize, String)> = chunker
                .split("doc-p", &text)
                .into_iter()
                .map(|chunk| (chunk.ordinal, chunk.id))
                .collect();
            prop_assert_eq!(first, second);
        }
    }
}
