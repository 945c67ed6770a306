use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::sync::Arc;

use docqa::answer::{Completer, CompletionError};
use docqa::app::App;
use docqa::config::Config;
use docqa::embedding::{Embedder, EmbeddingError};
use docqa::extract::ExtractorRegistry;
use docqa::server::router;
use docqa::store::MemoryIndexStore;

struct TopicEmbedder;

#[async_trait]
impl Embedder for TopicEmbedder {
    fn model_name(&self) -> &str {
        "topic"
    }
    fn dims(&self) -> usize {
        2
    }
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let text = text.to_lowercase();
        Ok(vec![
            if text.contains("cats") { 1.0 } else { 0.0 },
            if text.contains("dogs") { 1.0 } else { 0.0 },
        ])
    }
}

struct FixedCompleter;

#[async_trait]
impl Completer for FixedCompleter {
    fn model_name(&self) -> &str {
        "fixed"
    }
    async fn complete(&self, _prompt: &str) -> Result<String, CompletionError> {
        Ok("cats purr".to_string())
    }
}

async fn spawn_server(max_upload_bytes: usize) -> String {
    let app = App::with_components(
        &Config::default(),
        Arc::new(ExtractorRegistry::with_builtins()),
        Arc::new(TopicEmbedder),
        Arc::new(FixedCompleter),
        Arc::new(MemoryIndexStore::new()),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(Arc::new(app), max_upload_bytes);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn file_part(name: &str, body: &str) -> Part {
    Part::bytes(body.as_bytes().to_vec()).file_name(name.to_string())
}

#[tokio::test]
async fn test_upload_reports_per_file_outcomes() {
    let base = spawn_server(1024 * 1024).await;
    let form = Form::new()
        .part("file", file_part("cats.txt", "All about cats and their habits."))
        .part("file", file_part("dogs.md", "Dogs are loyal."))
        .part("file", file_part("photo.png", "not text"));

    let resp = reqwest::Client::new()
        .post(format!("{}/upload", base))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(
        body["fileEmbeddingCounts"],
        json!({ "cats.txt": 1, "dogs.md": 1 })
    );
    assert_eq!(body["totalChunks"], 2);
    assert_eq!(
        body["files"][2],
        json!({ "filename": "photo.png", "status": "skipped", "reason": "unsupported" })
    );
}

#[tokio::test]
async fn test_query_returns_answer_and_context() {
    let base = spawn_server(1024 * 1024).await;
    let client = reqwest::Client::new();

    let form = Form::new()
        .part("file", file_part("cats.txt", "cats sleep a lot"))
        .part("file", file_part("dogs.txt", "dogs bark"));
    client
        .post(format!("{}/upload", base))
        .multipart(form)
        .send()
        .await
        .unwrap();

    let resp = client
        .post(format!("{}/query", base))
        .json(&json!({ "question": "what do cats do?" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["answer"], "cats purr");
    assert_eq!(body["context"][0], "cats sleep a lot");
}

#[tokio::test]
async fn test_query_on_empty_index() {
    let base = spawn_server(1024 * 1024).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/query", base))
        .json(&json!({ "question": "anything" }))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(
        body,
        json!({ "answer": "No relevant information found in documents", "context": [] })
    );
}

#[tokio::test]
async fn test_blank_question_is_bad_request() {
    let base = spawn_server(1024 * 1024).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/query", base))
        .json(&json!({ "question": "  " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("empty"));
}

#[tokio::test]
async fn test_malformed_multipart_is_bad_request() {
    let base = spawn_server(1024 * 1024).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/upload", base))
        .header("content-type", "multipart/form-data; boundary=xyz")
        .body("garbage")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_upload_without_files_is_bad_request() {
    let base = spawn_server(1024 * 1024).await;
    let form = Form::new().text("note", "no files here");
    let resp = reqwest::Client::new()
        .post(format!("{}/upload", base))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_oversized_upload_is_rejected() {
    let base = spawn_server(1024).await;
    let big = "cats ".repeat(1000);
    let form = Form::new().part("file", file_part("big.txt", &big));
    let resp = reqwest::Client::new()
        .post(format!("{}/upload", base))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_malformed_query_json_is_bad_request() {
    let base = spawn_server(1024 * 1024).await;
    let resp = reqwest::Client::new()
        .post(format!("{}/query", base))
        .header("content-type", "application/json")
        .body("{ not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_stats_and_health() {
    let base = spawn_server(1024 * 1024).await;
    let client = reqwest::Client::new();

    let health: Value = client
        .get(format!("{}/health", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");

    client
        .post(format!("{}/upload", base))
        .multipart(Form::new().part("file", file_part("cats.txt", "cats")))
        .send()
        .await
        .unwrap();

    let stats: Value = client
        .get(format!("{}/stats", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats, json!({ "files": 1, "chunks": 1, "dims": 2 }));
}
