//! Fixed-size word-window chunker.
//!
//! Splits text on runs of whitespace and groups the resulting words into
//! windows of `words_per_chunk`, joined by single spaces. Chunk `i` holds
//! words `[i * w, (i + 1) * w)`.
//!
//! Scripts that do not separate words with whitespace are not specially
//! handled: a long run of such text counts as a single word.
//!
//! # Example
//!
//! ```rust
//! use docqa_core::chunk::chunk_words;
//!
//! let chunks: Vec<String> = chunk_words("one two  three\nfour five", 2).collect();
//! assert_eq!(chunks, vec!["one two", "three four", "five"]);
//! ```

use std::str::SplitWhitespace;

/// Default number of words per chunk.
pub const DEFAULT_WORDS_PER_CHUNK: usize = 500;

/// Lazy iterator over the chunks of a text.
///
/// The iterator borrows the text and allocates one `String` per chunk. A
/// clone continues independently from the same position, so cloning before
/// consuming (or calling [`chunk_words`] again) replays the sequence.
#[derive(Debug, Clone)]
pub struct WordChunks<'a> {
    words: SplitWhitespace<'a>,
    words_per_chunk: usize,
}

impl Iterator for WordChunks<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let mut out = String::new();
        for word in self.words.by_ref().take(self.words_per_chunk) {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(word);
        }
        if out.is_empty() {
            None
        } else {
            Some(out)
        }
    }
}

/// Split `text` into chunks of at most `words_per_chunk` words.
///
/// Empty or all-whitespace text yields no chunks. A `words_per_chunk` of 0
/// is treated as 1.
pub fn chunk_words(text: &str, words_per_chunk: usize) -> WordChunks<'_> {
    WordChunks {
        words: text.split_whitespace(),
        words_per_chunk: words_per_chunk.max(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word_count(text: &str) -> usize {
        text.split_whitespace().count()
    }

    fn words(n: usize) -> String {
        (0..n)
            .map(|i| format!("w{}", i))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn test_empty_text_yields_nothing() {
        assert_eq!(chunk_words("", 500).count(), 0);
    }

    #[test]
    fn test_whitespace_only_yields_nothing() {
        assert_eq!(chunk_words("  \n\t  \r\n ", 500).count(), 0);
    }

    #[test]
    fn test_thousand_words_two_chunks() {
        let text = words(1000);
        let chunks: Vec<String> = chunk_words(&text, 500).collect();
        assert_eq!(chunks.len(), 2);
        assert_eq!(word_count(&chunks[0]), 500);
        assert_eq!(word_count(&chunks[1]), 500);
        assert!(chunks[0].starts_with("w0 "));
        assert!(chunks[1].starts_with("w500 "));
    }

    #[test]
    fn test_partial_last_chunk() {
        let text = words(7);
        let chunks: Vec<String> = chunk_words(&text, 3).collect();
        assert_eq!(chunks, vec!["w0 w1 w2", "w3 w4 w5", "w6"]);
    }

    #[test]
    fn test_concatenation_is_whitespace_normalized_text() {
        let text = "  The quick\tbrown \n\n fox   jumps over\r\nthe lazy dog.  ";
        for w in 1..=10 {
            let joined = chunk_words(text, w).collect::<Vec<_>>().join(" ");
            assert_eq!(joined, "The quick brown fox jumps over the lazy dog.");
        }
    }

    #[test]
    fn test_restartable() {
        let text = words(12);
        let chunks = chunk_words(&text, 5);
        let first: Vec<String> = chunks.clone().collect();
        let second: Vec<String> = chunks.collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn test_zero_words_per_chunk_treated_as_one() {
        let chunks: Vec<String> = chunk_words("a b c", 0).collect();
        assert_eq!(chunks, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_non_whitespace_script_is_one_word() {
        let chunks: Vec<String> = chunk_words("日本語のテキスト", 1).collect();
        assert_eq!(chunks.len(), 1);
    }
}
