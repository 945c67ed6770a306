//! Core data models used throughout docqa.
//!
//! These types represent the chunks, file records, and index metadata that
//! flow through the ingestion and retrieval pipeline.

use serde::{Deserialize, Serialize};

/// An embedded text segment ready to be added to the index.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub text: String,
    /// SHA-256 hex digest of the file the chunk came from.
    pub source_hash: String,
    pub embedding: Vec<f32>,
}

/// A successfully ingested file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub hash: String,
    pub original_filename: String,
    pub chunk_count: usize,
}

/// Metadata stored for one indexed vector, at the same position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub text: String,
    pub hash: String,
}

/// Persisted metadata: every known file hash, plus one entry per vector.
///
/// Serializes as `{ "hashes": [...], "entries": [{ "text", "hash" }] }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMetadata {
    #[serde(default)]
    pub hashes: Vec<String>,
    #[serde(default)]
    pub entries: Vec<IndexEntry>,
}
