//! # docqa core
//!
//! Pure logic shared by the `docqa` application: data models, the
//! fixed-size word chunker, SHA-256 file deduplication, and the exact
//! nearest-neighbor vector index.
//!
//! This crate performs no filesystem or network I/O. Persistence, text
//! extraction, and the remote embedding and completion clients live in the
//! `docqa` application crate.

pub mod chunk;
pub mod dedup;
pub mod index;
pub mod models;
