//! Ingestion pipeline orchestration.
//!
//! Each uploaded file moves through
//! `Received → Extracted → { Skipped(duplicate) | Chunked → Embedded → Indexed }`.
//! Files are processed one after another and independently: an
//! unsupported type, a failed extraction, or a failed embedding call is
//! logged and recorded against that file only, and the rest of the batch
//! continues.
//!
//! The whole batch runs under the store's writer lock: the index is loaded
//! once, every indexed file is appended in memory, and the result is
//! persisted once at the end.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use docqa_core::chunk::chunk_words;
use docqa_core::dedup::{hash_bytes, KnownHashes};
use docqa_core::index::VectorIndex;
use docqa_core::models::{Chunk, FileRecord};

use crate::embedding::Embedder;
use crate::extract::{ExtractError, ExtractorRegistry};
use crate::store::{load_blocking, persist_blocking, IndexStore, StoreError};

/// A file as received from the upload form or the command line.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Duplicate,
    Unsupported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Extraction,
    /// Extraction succeeded but produced no words.
    Empty,
    Embedding,
}

/// Terminal state of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOutcome {
    Indexed { chunks: usize },
    Skipped { reason: SkipReason },
    Failed { stage: FailureStage, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileReport {
    pub filename: String,
    #[serde(flatten)]
    pub outcome: FileOutcome,
}

/// Result of one ingestion batch.
#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    /// One report per uploaded file, in upload order.
    pub files: Vec<FileReport>,
    /// Files indexed by this batch.
    pub indexed: Vec<FileRecord>,
    /// Entries in the index after the batch.
    pub total_chunks: usize,
}

impl IngestReport {
    /// Chunks indexed per original filename. Skipped and failed files are
    /// omitted.
    pub fn file_embedding_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for record in &self.indexed {
            *counts.entry(record.original_filename.clone()).or_insert(0) += record.chunk_count;
        }
        counts
    }

    pub fn count(&self, matches: impl Fn(&FileOutcome) -> bool) -> usize {
        self.files.iter().filter(|f| matches(&f.outcome)).count()
    }
}

/// Batch-level failures. Per-file problems never surface here.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("cannot load index: {0}")]
    Load(#[source] StoreError),

    #[error("cannot persist index: {0}")]
    Persist(#[source] StoreError),
}

pub struct Ingestor {
    extractors: Arc<ExtractorRegistry>,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn IndexStore>,
    words_per_chunk: usize,
}

impl Ingestor {
    pub fn new(
        extractors: Arc<ExtractorRegistry>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn IndexStore>,
        words_per_chunk: usize,
    ) -> Self {
        Self {
            extractors,
            embedder,
            store,
            words_per_chunk,
        }
    }

    /// Ingest a batch of files.
    pub async fn ingest(&self, files: Vec<UploadedFile>) -> Result<IngestReport, IngestError> {
        let _writer = self.store.write_lock().lock().await;

        let mut index = load_blocking(&self.store)
            .await
            .map_err(IngestError::Load)?;
        let mut known = index.known_hashes();
        let mut report = IngestReport::default();

        for file in files {
            let filename = file.filename.clone();
            let outcome = self.ingest_file(file, &mut index, &mut known, &mut report).await;
            match &outcome {
                FileOutcome::Indexed { chunks } => {
                    tracing::info!(file = %filename, chunks, "indexed");
                }
                FileOutcome::Skipped { reason } => {
                    tracing::warn!(file = %filename, ?reason, "skipped");
                }
                FileOutcome::Failed { stage, reason } => {
                    tracing::warn!(file = %filename, ?stage, %reason, "failed");
                }
            }
            report.files.push(FileReport { filename, outcome });
        }

        report.total_chunks = index.len();
        if !report.indexed.is_empty() {
            persist_blocking(&self.store, index)
                .await
                .map_err(IngestError::Persist)?;
        }
        Ok(report)
    }

    async fn ingest_file(
        &self,
        file: UploadedFile,
        index: &mut VectorIndex,
        known: &mut KnownHashes,
        report: &mut IngestReport,
    ) -> FileOutcome {
        if !self.extractors.supports(&file.filename) {
            return FileOutcome::Skipped {
                reason: SkipReason::Unsupported,
            };
        }

        let hash = hash_bytes(&file.bytes);
        let extractors = Arc::clone(&self.extractors);
        let name = file.filename.clone();
        let bytes = file.bytes;
        let extracted =
            tokio::task::spawn_blocking(move || extractors.extract(&name, &bytes)).await;
        let text = match extracted {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => return extraction_failure(e),
            Err(join_err) => {
                return FileOutcome::Failed {
                    stage: FailureStage::Extraction,
                    reason: format!("extractor crashed: {}", join_err),
                }
            }
        };

        if known.contains(&hash) {
            return FileOutcome::Skipped {
                reason: SkipReason::Duplicate,
            };
        }

        let texts: Vec<String> = chunk_words(&text, self.words_per_chunk).collect();
        if texts.is_empty() {
            return FileOutcome::Failed {
                stage: FailureStage::Empty,
                reason: "no text could be extracted".to_string(),
            };
        }

        let mut chunks = Vec::with_capacity(texts.len());
        for (i, text) in texts.into_iter().enumerate() {
            match self.embedder.embed(&text).await {
                Ok(embedding) => chunks.push(Chunk {
                    text,
                    source_hash: hash.clone(),
                    embedding,
                }),
                Err(e) => {
                    return FileOutcome::Failed {
                        stage: FailureStage::Embedding,
                        reason: format!("chunk {}: {}", i, e),
                    }
                }
            }
        }

        let added = match index.add(chunks) {
            Ok(added) => added,
            Err(e) => {
                return FileOutcome::Failed {
                    stage: FailureStage::Embedding,
                    reason: e.to_string(),
                }
            }
        };
        index.record_file(&hash);
        known.record_hash(hash.clone());
        report.indexed.push(FileRecord {
            hash,
            original_filename: file.filename,
            chunk_count: added,
        });
        FileOutcome::Indexed { chunks: added }
    }
}

fn extraction_failure(err: ExtractError) -> FileOutcome {
    if err.is_unsupported() {
        FileOutcome::Skipped {
            reason: SkipReason::Unsupported,
        }
    } else {
        FileOutcome::Failed {
            stage: FailureStage::Extraction,
            reason: err.to_string(),
        }
    }
}
