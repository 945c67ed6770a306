//! # docqa
//!
//! Question answering over uploaded documents.
//!
//! Uploaded files are converted to text, split into fixed-size word chunks,
//! embedded through the OpenAI embeddings API, and appended to an on-disk
//! vector index. Questions are embedded the same way; the nearest chunks
//! are handed to a chat model as context for the answer.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────────┐
//! │  Upload  │──▶│ Extract+Hash │──▶│ Chunk+Embed  │──▶ vectors.bin
//! │ CLI/HTTP │   │   + Dedupe   │   │              │    metadata.json
//! └──────────┘   └──────────────┘   └──────────────┘         │
//!                                                            ▼
//! ┌──────────┐   ┌──────────────┐   ┌──────────────┐   ┌──────────┐
//! │ Question │──▶│    Embed     │──▶│   Top-k L2   │──▶│ Complete │
//! └──────────┘   └──────────────┘   └──────────────┘   └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`extract`] | Text extraction per file type |
//! | [`openai`] | Shared HTTP client plumbing |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`answer`] | Prompt building and chat completion |
//! | [`store`] | Index persistence |
//! | [`ingest`] | Ingestion pipeline |
//! | [`query`] | Query pipeline |
//! | [`app`] | Pipeline wiring from configuration |
//! | [`server`] | HTTP server |
//! | [`logging`] | `tracing` subscriber setup |
//!
//! Chunking, hashing, and the in-memory index live in `docqa-core`.

pub mod answer;
pub mod app;
pub mod config;
pub mod embedding;
pub mod extract;
pub mod ingest;
pub mod logging;
pub mod openai;
pub mod query;
pub mod server;
pub mod store;
