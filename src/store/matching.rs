//! Case-insensitive query matching shared by the text index fallback and the live scan.
//!
//! A text matches when its whitespace-collapsed, lowercased form contains the whole query
//! phrase, or contains every query term somewhere. Both rules only ever accept texts that
//! literally contain what was asked for.

use crate::model::snippet;

/// Words of context kept before the first match when excerpting.
const LEAD_WORDS: usize = 8;

/// Compiled query for substring matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryMatcher {
    phrase: String,
    terms: Vec<String>,
}

impl QueryMatcher {
    /// Compile `query`. Returns `None` for blank queries, which match nothing.
    pub fn new(query: &str) -> Option<Self> {
        let phrase = collapse_lowercase(query);
        if phrase.is_empty() {
            return None;
        }

        let mut terms: Vec<String> = Vec::new();
        for word in phrase.split(' ') {
            let term = word.trim_matches(|c: char| !c.is_alphanumeric());
            if !term.is_empty() && !terms.iter().any(|existing| existing == term) {
                terms.push(term.to_string());
            }
        }

        Some(Self { phrase, terms })
    }

    /// Lowercased, whitespace-collapsed query.
    pub fn phrase(&self) -> &str {
        &self.phrase
    }

    /// Distinct alphanumeric terms of the query.
    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    /// Whether `text` contains the phrase or every term, ignoring case.
    pub fn matches(&self, text: &str) -> bool {
        self.matches_collapsed(&collapse_lowercase(text))
    }

    /// Relevance used to order matches: phrase hits weigh more than scattered term hits.
    /// Zero when `text` does not match.
    pub fn relevance(&self, text: &str) -> usize {
        let collapsed = collapse_lowercase(text);
        if !self.matches_collapsed(&collapsed) {
            return 0;
        }
        let phrase_hits = collapsed.matches(self.phrase.as_str()).count();
        let term_hits: usize = self
            .terms
            .iter()
            .map(|term| collapsed.matches(term.as_str()).count())
            .sum();
        phrase_hits * 4 + term_hits
    }

    /// Excerpt of `text` starting a few words before the first match, capped at `max_chars`.
    pub fn excerpt(&self, text: &str, max_chars: usize) -> String {
        let words: Vec<&str> = text.split_whitespace().collect();
        let Some(anchor) = self.first_match_word(&words) else {
            return snippet(text, max_chars);
        };
        let start = anchor.saturating_sub(LEAD_WORDS);
        let body = snippet(&words[start..].join(" "), max_chars);
        if start > 0 {
            format!("...{body}")
        } else {
            body
        }
    }

    /// Index, among `text`'s whitespace-separated words, of the word where the first match
    /// starts. `None` when nothing in `text` matches a phrase or term.
    pub fn first_match_position(&self, text: &str) -> Option<usize> {
        let words: Vec<&str> = text.split_whitespace().collect();
        self.first_match_word(&words)
    }

    fn matches_collapsed(&self, collapsed: &str) -> bool {
        if collapsed.contains(self.phrase.as_str()) {
            return true;
        }
        !self.terms.is_empty()
            && self
                .terms
                .iter()
                .all(|term| collapsed.contains(term.as_str()))
    }

    fn first_match_word(&self, words: &[&str]) -> Option<usize> {
        let mut collapsed = String::new();
        let mut offsets = Vec::with_capacity(words.len());
        for word in words {
            if !collapsed.is_empty() {
                collapsed.push(' ');
            }
            offsets.push(collapsed.len());
            collapsed.push_str(&word.to_lowercase());
        }

        let byte = collapsed.find(self.phrase.as_str()).or_else(|| {
            self.terms
                .iter()
                .filter_map(|term| collapsed.find(term.as_str()))
                .min()
        })?;
        Some(offsets.partition_point(|offset| *offset <= byte).saturating_sub(1))
    }
}

fn collapse_lowercase(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_query_compiles_to_nothing() {
        assert!(QueryMatcher::new("   ").is_none());
    }

    #[test]
    fn phrase_match_ignores_case_and_layout() {
        let matcher = QueryMatcher::new("Refund Policy").expect("matcher");
        assert!(matcher.matches("Our REFUND\n   policy covers annual plans."));
        assert!(!matcher.matches("Shipping terms only."));
    }

    #[test]
    fn scattered_terms_match_only_when_all_present() {
        let matcher = QueryMatcher::new("refund, annual?").expect("matcher");
        assert_eq!(matcher.terms(), ["refund", "annual"]);
        assert!(matcher.matches("Annual plans qualify for a refund."));
        assert!(!matcher.matches("Monthly plans qualify for a refund."));
    }

    #[test]
    fn relevance_prefers_phrase_hits() {
        let matcher = QueryMatcher::new("refund policy").expect("matcher");
        let phrase = matcher.relevance("the refund policy");
        let scattered = matcher.relevance("policy on any refund");
        assert!(phrase > scattered);
        assert!(scattered > 0);
        assert_eq!(matcher.relevance("nothing relevant"), 0);
    }

    #[test]
    fn first_match_position_counts_words() {
        let matcher = QueryMatcher::new("Refund Policy").expect("matcher");
        assert_eq!(matcher.first_match_position("a b\n refund   POLICY c"), Some(2));
        assert_eq!(matcher.first_match_position("nothing here"), None);
    }

    #[test]
    fn excerpt_starts_near_the_match() {
        let matcher = QueryMatcher::new("refund policy").expect("matcher");
        let filler = (0..40).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
        let text = format!("{filler} The Refund Policy applies to annual plans.");
        let excerpt = matcher.excerpt(&text, 200);
        assert!(excerpt.starts_with("...w33"));
        assert!(excerpt.contains("Refund Policy"));
    }
}
