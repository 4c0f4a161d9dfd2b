//! Content and filename fingerprints.
//!
//! Content fingerprints are SHA-256 digests over whitespace-collapsed text, so re-saving a
//! document with different line wrapping or trailing spaces keeps its identity while any change
//! to the words or their order produces a new fingerprint. Name fingerprints hash the normalized
//! filename and are only used as a similarity hint, never for equality decisions.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Hex fingerprint of text with no words (SHA-256 of the empty string).
pub const EMPTY_CONTENT_HEX: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// 256-bit SHA-256 fingerprint.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex rendering used for storage and payloads.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Whether this is the fingerprint of text with no words.
    ///
    /// Every document without extractable text shares it, so it never identifies content.
    pub fn is_empty_content(&self) -> bool {
        *self == hash_content("")
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", &self.to_hex()[..12])
    }
}

/// Error returned when parsing a hex fingerprint.
#[derive(Debug, thiserror::Error)]
#[error("invalid fingerprint: {0}")]
pub struct FingerprintParseError(String);

impl FromStr for Fingerprint {
    type Err = FingerprintParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s.trim()).map_err(|err| FingerprintParseError(err.to_string()))?;
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| FingerprintParseError(format!("expected 32 bytes in '{s}'")))?;
        Ok(Self(array))
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Fingerprint the full extracted text of a document.
///
/// Whitespace runs are collapsed to a single space and leading/trailing whitespace is ignored.
/// The digest is fed word by word so no normalized copy of the text is allocated.
pub fn hash_content(content: &str) -> Fingerprint {
    let mut hasher = Sha256::new();
    let mut first = true;
    for word in content.split_whitespace() {
        if !first {
            hasher.update(b" ");
        }
        hasher.update(word.as_bytes());
        first = false;
    }
    Fingerprint(hasher.finalize().into())
}

/// Fingerprint a filename after [`normalize_name`].
pub fn hash_name(filename: &str) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(normalize_name(filename).as_bytes());
    Fingerprint(hasher.finalize().into())
}

/// Normalize a filename for similarity comparison.
///
/// Drops any directory prefix and the final extension, lowercases, and turns separator
/// punctuation (`_`, `-`, `.`) into single spaces: `"Q3_Refund-Policy (v2).PDF"` becomes
/// `"q3 refund policy (v2)"`.
pub fn normalize_name(filename: &str) -> String {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename)
        .trim();
    let stem = match base.rfind('.') {
        Some(pos) if pos > 0 => &base[..pos],
        _ => base,
    };
    stem.to_lowercase()
        .split(|c: char| c.is_whitespace() || matches!(c, '_' | '-' | '.'))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_stable() {
        let h1 = hash_content("Hello world");
        let h2 = hash_content("Hello world");
        assert_eq!(h1, h2);
        assert_eq!(h1.to_hex().len(), 64);
    }

    #[test]
    fn content_hash_ignores_whitespace_layout() {
        let wrapped = "The refund\npolicy  applies\t\tto   all orders.\n";
        let flat = "  The refund policy applies to all orders.";
        assert_eq!(hash_content(wrapped), hash_content(flat));
    }

    #[test]
    fn content_hash_is_order_sensitive() {
        assert_ne!(hash_content("alpha beta"), hash_content("beta alpha"));
        assert_ne!(hash_content("alphabeta"), hash_content("alpha beta"));
    }

    #[test]
    fn empty_and_blank_content_share_a_fingerprint() {
        assert_eq!(hash_content(""), hash_content(" \n\t "));
        assert_eq!(hash_content("").to_hex(), EMPTY_CONTENT_HEX);
        assert!(hash_content(" \n").is_empty_content());
        assert!(!hash_content("a").is_empty_content());
    }

    #[test]
    fn hashes_a_megabyte_quickly() {
        let text = "lorem ipsum dolor sit amet ".repeat(40_000);
        assert!(text.len() > 1_000_000);
        let started = std::time::Instant::now();
        let _ = hash_content(&text);
        // Generous bound so debug builds on slow CI still pass.
        assert!(started.elapsed() < std::time::Duration::from_secs(2));
    }

    #[test]
    fn normalize_name_strips_extension_and_separators() {
        assert_eq!(
            normalize_name("uploads/Q3_Refund-Policy (v2).PDF"),
            "q3 refund policy (v2)"
        );
        assert_eq!(normalize_name(".env"), "env");
        assert_eq!(normalize_name("report"), "report");
    }

    #[test]
    fn name_hash_follows_normalization() {
        assert_eq!(hash_name("Refund_Policy.pdf"), hash_name("refund policy.docx"));
        assert_ne!(hash_name("refund policy.pdf"), hash_name("refund policies.pdf"));
    }

    #[test]
    fn fingerprint_round_trips_through_hex() {
        let fingerprint = hash_content("sample");
        let parsed: Fingerprint = fingerprint.to_hex().parse().expect("valid hex");
        assert_eq!(parsed, fingerprint);
        assert!("zz".parse::<Fingerprint>().is_err());
        assert!("abcd".parse::<Fingerprint>().is_err());
    }
}
