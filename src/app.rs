//! Wiring of the pipelines from configuration.
//!
//! [`App`] owns one shared store and hands it to both the ingestion and the
//! query pipeline, so the CLI and the HTTP server see the same index.

use std::sync::Arc;

use anyhow::Result;
use serde::Serialize;

use crate::answer::{Completer, OpenAiCompleter};
use crate::config::Config;
use crate::embedding::{Embedder, OpenAiEmbedder};
use crate::extract::ExtractorRegistry;
use crate::ingest::Ingestor;
use crate::query::QueryEngine;
use crate::store::{load_blocking, FileIndexStore, IndexStore, StoreError};

pub struct App {
    pub ingestor: Ingestor,
    pub engine: QueryEngine,
    pub store: Arc<dyn IndexStore>,
}

/// Index summary reported by `stats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStats {
    pub files: usize,
    pub chunks: usize,
    pub dims: usize,
}

impl App {
    /// Build the OpenAI-backed pipelines over the on-disk store.
    pub fn from_config(config: &Config, api_key: &str) -> Result<Self> {
        let embedder = OpenAiEmbedder::new(&config.embedding, api_key)?;
        let completer = OpenAiCompleter::new(&config.completion, api_key)?;
        let store = FileIndexStore::new(&config.storage.dir);
        Ok(Self::with_components(
            config,
            Arc::new(ExtractorRegistry::with_builtins()),
            Arc::new(embedder),
            Arc::new(completer),
            Arc::new(store),
        ))
    }

    pub fn with_components(
        config: &Config,
        extractors: Arc<ExtractorRegistry>,
        embedder: Arc<dyn Embedder>,
        completer: Arc<dyn Completer>,
        store: Arc<dyn IndexStore>,
    ) -> Self {
        let ingestor = Ingestor::new(
            extractors,
            embedder.clone(),
            store.clone(),
            config.chunking.words_per_chunk,
        );
        let engine = QueryEngine::new(embedder, completer, store.clone(), config.retrieval.top_k);
        Self {
            ingestor,
            engine,
            store,
        }
    }

    pub async fn stats(&self) -> Result<IndexStats, StoreError> {
        let index = load_blocking(&self.store).await?;
        Ok(IndexStats {
            files: index.metadata().hashes.len(),
            chunks: index.len(),
            dims: index.dims(),
        })
    }
}
