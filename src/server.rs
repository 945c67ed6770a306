//! HTTP server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/upload` | Multipart upload; every `file` field is ingested |
//! | `POST` | `/query` | `{ "question": "..." }` → `{ "answer", "context" }` |
//! | `GET`  | `/stats` | Indexed file and chunk counts |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! Every error response is `{ "error": "<message>" }`:
//!
//! | Status | Cause |
//! |--------|-------|
//! | 400 | malformed multipart or JSON body, no files, empty question |
//! | 413 | upload larger than `[server].max_upload_bytes` |
//! | 502 | embedding or completion API failure |
//! | 503 | index missing, corrupt, or not searchable |
//! | 500 | index could not be written |
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so a browser front end
//! can be served from anywhere.

use axum::{
    extract::{
        multipart::MultipartError, rejection::JsonRejection, DefaultBodyLimit, Multipart, State,
    },
    http::{header, StatusCode},
    middleware::map_response,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;

use crate::app::{App, IndexStats};
use crate::config::Config;
use crate::ingest::{FileReport, IngestError, UploadedFile};
use crate::query::{Answer, QueryError};

/// Multipart field name carrying uploaded files.
pub const FILE_FIELD: &str = "file";

/// Build the router over a shared [`App`].
pub fn router(app: Arc<App>, max_upload_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/upload", post(handle_upload))
        .route("/query", post(handle_query))
        .route("/stats", get(handle_stats))
        .route("/health", get(handle_health))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload_bytes))
        .layer(map_response(oversized_body_as_json))
        .layer(cors)
        .with_state(app)
}

/// Bind `[server].bind` and serve until the process is terminated.
pub async fn run_server(config: &Config, app: Arc<App>) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, router(app, config.server.max_upload_bytes)).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, error = %self.message, "request failed");
        } else {
            tracing::warn!(status = %self.status, error = %self.message, "request rejected");
        }
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::new(rejection.status(), rejection.body_text())
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        AppError::new(err.status(), err.body_text())
    }
}

impl From<QueryError> for AppError {
    fn from(err: QueryError) -> Self {
        let status = match &err {
            QueryError::InvalidQuestion => StatusCode::BAD_REQUEST,
            QueryError::IndexUnavailable(_) | QueryError::Retrieval(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            QueryError::Embedding(_) | QueryError::Completion(_) => StatusCode::BAD_GATEWAY,
        };
        AppError::new(status, err.to_string())
    }
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        let status = match &err {
            IngestError::Load(_) => StatusCode::SERVICE_UNAVAILABLE,
            IngestError::Persist(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        AppError::new(status, err.to_string())
    }
}

/// The body limit layer answers 413 in plain text before any handler runs.
async fn oversized_body_as_json(response: Response) -> Response {
    let is_json = response
        .headers()
        .get(header::CONTENT_TYPE)
        .is_some_and(|v| v.as_bytes().starts_with(b"application/json"));
    if response.status() == StatusCode::PAYLOAD_TOO_LARGE && !is_json {
        return AppError::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            "request body exceeds the upload size limit",
        )
        .into_response();
    }
    response
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /upload ============

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    file_embedding_counts: BTreeMap<String, usize>,
    files: Vec<FileReport>,
    total_chunks: usize,
}

async fn handle_upload(
    State(app): State<Arc<App>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut files = Vec::new();
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::to_string)
            .unwrap_or_else(|| "upload".to_string());
        let bytes = field.bytes().await?;
        files.push(UploadedFile::new(filename, bytes.to_vec()));
    }

    if files.is_empty() {
        return Err(AppError::new(
            StatusCode::BAD_REQUEST,
            format!("no '{}' fields in upload", FILE_FIELD),
        ));
    }

    tracing::info!(files = files.len(), "upload received");
    let report = app.ingestor.ingest(files).await?;
    Ok(Json(UploadResponse {
        file_embedding_counts: report.file_embedding_counts(),
        files: report.files,
        total_chunks: report.total_chunks,
    }))
}

// ============ POST /query ============

#[derive(Deserialize)]
struct QueryRequest {
    #[serde(default)]
    question: String,
}

async fn handle_query(
    State(app): State<Arc<App>>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<Answer>, AppError> {
    let Json(req) = payload?;
    let answer = app.engine.ask(&req.question).await?;
    Ok(Json(answer))
}

// ============ GET /stats ============

async fn handle_stats(State(app): State<Arc<App>>) -> Result<Json<IndexStats>, AppError> {
    app.stats()
        .await
        .map(Json)
        .map_err(|e| AppError::new(StatusCode::SERVICE_UNAVAILABLE, e.to_string()))
}
