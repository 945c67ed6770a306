//! Query pipeline.
//!
//! `Received → Embedded → Retrieved → Answered`. Any stage failing ends the
//! request with a [`QueryError`] naming that stage. An empty index short-
//! circuits to [`NO_RELEVANT_INFORMATION`] without calling the embedding
//! or completion APIs.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use docqa_core::index::IndexError;

use crate::answer::{build_prompt, Completer, CompletionError};
use crate::embedding::{Embedder, EmbeddingError};
use crate::store::{load_blocking, IndexStore, StoreError};

/// Answer returned when nothing has been indexed yet.
pub const NO_RELEVANT_INFORMATION: &str = "No relevant information found in documents";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub answer: String,
    /// Retrieved chunk texts, nearest first.
    pub context: Vec<String>,
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("question must not be empty")]
    InvalidQuestion,

    #[error("search service unavailable: {0}")]
    IndexUnavailable(#[source] StoreError),

    #[error("failed to embed question: {0}")]
    Embedding(#[source] EmbeddingError),

    #[error("retrieval failed: {0}")]
    Retrieval(#[source] IndexError),

    #[error("failed to generate answer: {0}")]
    Completion(#[source] CompletionError),
}

impl QueryError {
    pub fn stage(&self) -> &'static str {
        match self {
            QueryError::InvalidQuestion => "validation",
            QueryError::IndexUnavailable(_) => "index",
            QueryError::Embedding(_) => "embedding",
            QueryError::Retrieval(_) => "retrieval",
            QueryError::Completion(_) => "completion",
        }
    }
}

pub struct QueryEngine {
    embedder: Arc<dyn Embedder>,
    completer: Arc<dyn Completer>,
    store: Arc<dyn IndexStore>,
    top_k: usize,
}

impl QueryEngine {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        completer: Arc<dyn Completer>,
        store: Arc<dyn IndexStore>,
        top_k: usize,
    ) -> Self {
        Self {
            embedder,
            completer,
            store,
            top_k,
        }
    }

    pub async fn ask(&self, question: &str) -> Result<Answer, QueryError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(QueryError::InvalidQuestion);
        }

        let index = load_blocking(&self.store)
            .await
            .map_err(QueryError::IndexUnavailable)?;
        if index.is_empty() {
            tracing::info!("index is empty, nothing to retrieve");
            return Ok(Answer {
                answer: NO_RELEVANT_INFORMATION.to_string(),
                context: Vec::new(),
            });
        }

        let query_vec = self
            .embedder
            .embed(question)
            .await
            .map_err(QueryError::Embedding)?;

        let context: Vec<String> = index
            .search(&query_vec, self.top_k)
            .map_err(QueryError::Retrieval)?
            .into_iter()
            .map(|hit| hit.entry.text.clone())
            .collect();
        tracing::debug!(hits = context.len(), "retrieved context");

        let prompt = build_prompt(question, &context);
        let answer = self
            .completer
            .complete(&prompt)
            .await
            .map_err(QueryError::Completion)?;

        Ok(Answer { answer, context })
    }
}
