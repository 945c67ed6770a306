//! Exact nearest-neighbor vector index.
//!
//! [`VectorIndex`] keeps embeddings in one flat `f32` buffer together with
//! an [`IndexMetadata`] whose `entries` are positionally aligned with the
//! vectors: vector `i` belongs to `entries[i]`. Every public mutation
//! preserves `len(vectors) == len(entries)`.
//!
//! Search is brute force over every stored vector using squared Euclidean
//! (L2) distance. Results are ordered by ascending distance; equal
//! distances are ordered by insertion position, lower first.
//!
//! # Example
//!
//! ```rust
//! use docqa_core::index::VectorIndex;
//! use docqa_core::models::Chunk;
//!
//! let mut index = VectorIndex::new();
//! index
//!     .add(vec![
//!         Chunk { text: "north".into(), source_hash: "h".into(), embedding: vec![0.0, 1.0] },
//!         Chunk { text: "east".into(), source_hash: "h".into(), embedding: vec![1.0, 0.0] },
//!     ])
//!     .unwrap();
//!
//! let hits = index.search(&[0.9, 0.1], 1).unwrap();
//! assert_eq!(hits[0].entry.text, "east");
//! ```

use thiserror::Error;

use crate::dedup::KnownHashes;
use crate::models::{Chunk, IndexEntry, IndexMetadata};

/// Default retrieval breadth.
pub const DEFAULT_TOP_K: usize = 5;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IndexError {
    #[error("embedding has {actual} dimensions, index expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding must not be empty")]
    EmptyEmbedding,

    #[error("index is misaligned: {vectors} vectors but {entries} metadata entries")]
    Misaligned { vectors: usize, entries: usize },
}

/// One search result, borrowing its metadata from the index.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit<'a> {
    /// Insertion position of the matched vector.
    pub position: usize,
    /// Squared L2 distance to the query.
    pub distance: f32,
    pub entry: &'a IndexEntry,
}

#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    /// 0 until the first vector is added.
    dims: usize,
    data: Vec<f32>,
    metadata: IndexMetadata,
}

impl VectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild an index from persisted parts.
    ///
    /// Fails with [`IndexError::Misaligned`] unless `data` holds exactly one
    /// `dims`-sized vector per metadata entry.
    pub fn from_parts(
        dims: usize,
        data: Vec<f32>,
        metadata: IndexMetadata,
    ) -> Result<Self, IndexError> {
        let entries = metadata.entries.len();
        let vectors = if dims == 0 {
            if !data.is_empty() {
                return Err(IndexError::Misaligned {
                    vectors: data.len(),
                    entries,
                });
            }
            0
        } else {
            if data.len() % dims != 0 {
                return Err(IndexError::Misaligned {
                    vectors: data.len() / dims,
                    entries,
                });
            }
            data.len() / dims
        };
        if vectors != entries {
            return Err(IndexError::Misaligned { vectors, entries });
        }
        Ok(Self {
            dims,
            data,
            metadata,
        })
    }

    /// Vector dimensionality, or 0 for an index that has never held a vector.
    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.metadata.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metadata.entries.is_empty()
    }

    pub fn metadata(&self) -> &IndexMetadata {
        &self.metadata
    }

    /// The flat vector buffer, `len() * dims()` values.
    pub fn raw_vectors(&self) -> &[f32] {
        &self.data
    }

    pub fn vectors(&self) -> impl Iterator<Item = &[f32]> + '_ {
        self.data.chunks_exact(self.dims.max(1))
    }

    /// Snapshot of every recorded file hash.
    pub fn known_hashes(&self) -> KnownHashes {
        self.metadata.hashes.iter().cloned().collect()
    }

    /// Record a successfully ingested file's hash. No-op if already present.
    pub fn record_file(&mut self, hash: &str) {
        if !self.metadata.hashes.iter().any(|h| h == hash) {
            self.metadata.hashes.push(hash.to_string());
        }
    }

    /// Append chunks in order. Returns the number added.
    ///
    /// The whole batch is validated first; on error the index is unchanged.
    pub fn add(&mut self, chunks: Vec<Chunk>) -> Result<usize, IndexError> {
        let mut dims = self.dims;
        for chunk in &chunks {
            let actual = chunk.embedding.len();
            if actual == 0 {
                return Err(IndexError::EmptyEmbedding);
            }
            if dims == 0 {
                dims = actual;
            } else if actual != dims {
                return Err(IndexError::DimensionMismatch {
                    expected: dims,
                    actual,
                });
            }
        }

        let added = chunks.len();
        self.dims = dims;
        self.data.reserve(added * dims);
        self.metadata.entries.reserve(added);
        for chunk in chunks {
            self.data.extend_from_slice(&chunk.embedding);
            self.metadata.entries.push(IndexEntry {
                text: chunk.text,
                hash: chunk.source_hash,
            });
        }
        Ok(added)
    }

    /// The `k` entries closest to `query`, nearest first.
    ///
    /// An empty index returns no hits regardless of the query.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit<'_>>, IndexError> {
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dims {
            return Err(IndexError::DimensionMismatch {
                expected: self.dims,
                actual: query.len(),
            });
        }

        let mut scored: Vec<(f32, usize)> = self
            .vectors()
            .enumerate()
            .map(|(position, vector)| (squared_l2(query, vector), position))
            .collect();
        scored.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(distance, position)| SearchHit {
                position,
                distance,
                entry: &self.metadata.entries[position],
            })
            .collect())
    }
}

/// Squared Euclidean distance. Callers guarantee equal lengths.
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}
