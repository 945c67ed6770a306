//! Embedding client.
//!
//! The [`Embedder`] trait turns one text into a fixed-length vector.
//! [`OpenAiEmbedder`] calls `POST {base_url}/embeddings`; tests supply
//! their own deterministic implementations.
//!
//! Calls are made one text at a time and are not retried: the caller
//! decides what a failure means (skip the file during ingestion, fail the
//! request during a query).

use async_trait::async_trait;
use thiserror::Error;

use crate::config::EmbeddingConfig;
use crate::openai::{self, ApiError};

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding API call failed: {0}")]
    Api(#[from] ApiError),

    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    #[error("embedding has {actual} dimensions, expected {expected}")]
    Dimensions { expected: usize, actual: usize },
}

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Embedding provider using the OpenAI API.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    dims: usize,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig, api_key: impl Into<String>) -> Result<Self, EmbeddingError> {
        Ok(Self {
            client: openai::build_client(config.timeout_secs)?,
            url: openai::endpoint(&config.base_url, "embeddings"),
            api_key: api_key.into(),
            model: config.model.clone(),
            dims: config.dims,
        })
    }

    fn request_body(&self, text: &str) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.model,
            "input": [text],
        });
        // Only the v3 models accept a requested output size.
        if self.model.starts_with("text-embedding-3") {
            body["dimensions"] = serde_json::json!(self.dims);
        }
        body
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let body = self.request_body(text);
        let json = openai::post_json(&self.client, &self.url, &self.api_key, &body).await?;
        let vector = parse_embedding_response(&json)?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::InvalidResponse("empty data array".to_string()))?;
        check_dims(&vector, self.dims)?;
        Ok(vector)
    }
}

/// Extract `data[].embedding` arrays, ordered by their `index` field.
pub fn parse_embedding_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| EmbeddingError::InvalidResponse("missing data array".to_string()))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| EmbeddingError::InvalidResponse("missing embedding".to_string()))?;
        let vector = embedding
            .iter()
            .map(|v| {
                v.as_f64()
                    .map(|f| f as f32)
                    .ok_or_else(|| EmbeddingError::InvalidResponse("non-numeric value".to_string()))
            })
            .collect::<Result<Vec<f32>, _>>()?;
        indexed.push((index, vector));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

/// Reject vectors whose length differs from the configured dimensionality.
pub fn check_dims(vector: &[f32], expected: usize) -> Result<(), EmbeddingError> {
    if vector.len() != expected {
        return Err(EmbeddingError::Dimensions {
            expected,
            actual: vector.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_orders_by_index() {
        let json = serde_json::json!({
            "data": [
                { "index": 1, "embedding": [0.5, 0.5] },
                { "index": 0, "embedding": [1.0, -1.0] }
            ]
        });
        let vectors = parse_embedding_response(&json).unwrap();
        assert_eq!(vectors, vec![vec![1.0, -1.0], vec![0.5, 0.5]]);
    }

    #[test]
    fn test_parse_missing_data() {
        let err = parse_embedding_response(&serde_json::json!({ "error": "x" })).unwrap_err();
        assert!(matches!(err, EmbeddingError::InvalidResponse(_)));
    }

    #[test]
    fn test_parse_rejects_non_numeric() {
        let json = serde_json::json!({ "data": [{ "embedding": [1.0, "x"] }] });
        assert!(parse_embedding_response(&json).is_err());
    }

    #[test]
    fn test_check_dims() {
        assert!(check_dims(&[0.0; 4], 4).is_ok());
        assert!(matches!(
            check_dims(&[0.0; 3], 4),
            Err(EmbeddingError::Dimensions {
                expected: 4,
                actual: 3
            })
        ));
    }

    #[test]
    fn test_request_body_dimensions_only_for_v3() {
        let mut config = EmbeddingConfig::default();
        let v3 = OpenAiEmbedder::new(&config, "key").unwrap();
        assert_eq!(v3.request_body("hi")["dimensions"], 1536);

        config.model = "text-embedding-ada-002".to_string();
        let ada = OpenAiEmbedder::new(&config, "key").unwrap();
        assert!(ada.request_body("hi").get("dimensions").is_none());
        assert_eq!(ada.request_body("hi")["input"][0], "hi");
    }
}
