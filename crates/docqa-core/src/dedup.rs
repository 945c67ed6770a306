//! Content-hash file deduplication.
//!
//! A file is identified by the SHA-256 of its raw bytes (not its extracted
//! text). [`KnownHashes`] is the in-memory set of hashes from previously
//! completed ingestions, loaded once per ingestion request.

use std::collections::HashSet;

use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 digest of `bytes`.
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Set of file hashes already ingested.
#[derive(Debug, Clone, Default)]
pub struct KnownHashes {
    hashes: HashSet<String>,
}

impl KnownHashes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.hashes.contains(hash)
    }

    /// Returns `true` when a file with identical bytes has been recorded.
    pub fn is_duplicate(&self, bytes: &[u8]) -> bool {
        self.contains(&hash_bytes(bytes))
    }

    /// Record a hash. Returns `false` if it was already known.
    pub fn record_hash(&mut self, hash: impl Into<String>) -> bool {
        self.hashes.insert(hash.into())
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for KnownHashes {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            hashes: iter.into_iter().map(Into::into).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_known_vector() {
        assert_eq!(
            hash_bytes(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_duplicate_after_record() {
        let mut known = KnownHashes::new();
        let bytes = b"same content";
        assert!(!known.is_duplicate(bytes));
        assert!(known.record_hash(hash_bytes(bytes)));
        assert!(known.is_duplicate(bytes));
        assert!(!known.is_duplicate(b"other content"));
    }

    #[test]
    fn test_record_twice_reports_known() {
        let mut known = KnownHashes::new();
        assert!(known.record_hash("h1"));
        assert!(!known.record_hash("h1"));
        assert_eq!(known.len(), 1);
    }

    #[test]
    fn test_from_persisted_hashes() {
        let known: KnownHashes = vec![hash_bytes(b"a"), hash_bytes(b"b")]
            .into_iter()
            .collect();
        assert!(known.is_duplicate(b"a"));
        assert!(known.is_duplicate(b"b"));
        assert!(!known.is_duplicate(b"c"));
    }
}
