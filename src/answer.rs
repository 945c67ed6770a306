//! Answer composition.
//!
//! [`build_prompt`] formats retrieved excerpts and the user's question into
//! a single prompt; a [`Completer`] sends it to a language model.
//! [`OpenAiCompleter`] uses `POST {base_url}/chat/completions`.

use async_trait::async_trait;
use thiserror::Error;

use crate::config::CompletionConfig;
use crate::openai::{self, ApiError};

const SYSTEM_MESSAGE: &str =
    "You answer questions using only the document excerpts you are given. \
     If the excerpts do not contain the answer, say so.";

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion API call failed: {0}")]
    Api(#[from] ApiError),

    #[error("invalid completion response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait Completer: Send + Sync {
    fn model_name(&self) -> &str;

    async fn complete(&self, prompt: &str) -> Result<String, CompletionError>;
}

/// Build the question-answering prompt from retrieved excerpts.
pub fn build_prompt(question: &str, excerpts: &[String]) -> String {
    format!(
        "Use the following excerpts from documents to answer the question.\n\n\
         Excerpts:\n{}\n\n\
         Question: {}\n\
         Answer:",
        excerpts.join("\n---\n"),
        question.trim()
    )
}

/// Chat-completion client for the OpenAI API.
pub struct OpenAiCompleter {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAiCompleter {
    pub fn new(
        config: &CompletionConfig,
        api_key: impl Into<String>,
    ) -> Result<Self, CompletionError> {
        Ok(Self {
            client: openai::build_client(config.timeout_secs)?,
            url: openai::endpoint(&config.base_url, "chat/completions"),
            api_key: api_key.into(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl Completer for OpenAiCompleter {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String, CompletionError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_MESSAGE },
                { "role": "user", "content": prompt },
            ],
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        });
        let json = openai::post_json(&self.client, &self.url, &self.api_key, &body).await?;
        parse_completion_response(&json)
    }
}

/// Extract `choices[0].message.content`, trimmed.
pub fn parse_completion_response(json: &serde_json::Value) -> Result<String, CompletionError> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| {
            CompletionError::InvalidResponse("missing choices[0].message.content".to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_layout() {
        let prompt = build_prompt(
            "  What is alpha? ",
            &["alpha is first".to_string(), "beta is second".to_string()],
        );
        assert_eq!(
            prompt,
            "Use the following excerpts from documents to answer the question.\n\n\
             Excerpts:\nalpha is first\n---\nbeta is second\n\n\
             Question: What is alpha?\nAnswer:"
        );
    }

    #[test]
    fn test_parse_completion() {
        let json = serde_json::json!({
            "choices": [{ "message": { "role": "assistant", "content": "  42 \n" } }]
        });
        assert_eq!(parse_completion_response(&json).unwrap(), "42");
    }

    #[test]
    fn test_parse_completion_missing_content() {
        let json = serde_json::json!({ "choices": [] });
        assert!(matches!(
            parse_completion_response(&json),
            Err(CompletionError::InvalidResponse(_))
        ));
    }
}
