//! Durable storage for the vector index.
//!
//! [`FileIndexStore`] keeps two sibling files in the storage directory:
//!
//! | File | Contents |
//! |------|----------|
//! | `vectors.bin` | header + `count × dims` little-endian `f32` values |
//! | `metadata.json` | `{ "hashes": [...], "entries": [{ "text", "hash" }] }` |
//!
//! # Vector file layout
//!
//! ```text
//! magic    [u8; 4]  "DQVI"
//! version  u16 LE   1
//! dims     u32 LE
//! count    u32 LE
//! values   [f32 LE; count * dims]
//! ```
//!
//! # Consistency
//!
//! Each file is written to a temporary sibling, fsynced, then renamed into
//! place: vectors first, metadata second. A reader therefore sees whole
//! files only. If a crash lands between the two renames the entry counts
//! disagree and [`IndexStore::load`] fails with [`StoreError::Corrupt`];
//! the index must then be reset and rebuilt from the source documents.
//!
//! Writers serialize through [`IndexStore::write_lock`], held across the
//! whole load → add → persist cycle of an ingestion batch.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;

use docqa_core::index::{IndexError, VectorIndex};
use docqa_core::models::IndexMetadata;

pub const VECTORS_FILE: &str = "vectors.bin";
pub const METADATA_FILE: &str = "metadata.json";

const MAGIC: [u8; 4] = *b"DQVI";
const FORMAT_VERSION: u16 = 1;
const HEADER_LEN: usize = 4 + 2 + 4 + 4;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("index is corrupt: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("storage task failed: {0}")]
    Task(String),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Persistence for a [`VectorIndex`] and its metadata.
pub trait IndexStore: Send + Sync {
    /// Load the persisted index. A store with nothing persisted yields an
    /// empty index.
    fn load(&self) -> Result<VectorIndex, StoreError>;

    /// Replace the persisted index with `index`.
    fn persist(&self, index: &VectorIndex) -> Result<(), StoreError>;

    /// Delete everything persisted.
    fn reset(&self) -> Result<(), StoreError>;

    /// Lock serializing writers.
    fn write_lock(&self) -> &Mutex<()>;
}

/// Run [`IndexStore::load`] on the blocking thread pool.
pub async fn load_blocking(store: &Arc<dyn IndexStore>) -> Result<VectorIndex, StoreError> {
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || store.load())
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
}

/// Run [`IndexStore::persist`] on the blocking thread pool. The index is
/// handed back once it is written.
pub async fn persist_blocking(
    store: &Arc<dyn IndexStore>,
    index: VectorIndex,
) -> Result<VectorIndex, StoreError> {
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || store.persist(&index).map(|()| index))
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
}

// ============ File store ============

pub struct FileIndexStore {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl FileIndexStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn vectors_path(&self) -> PathBuf {
        self.dir.join(VECTORS_FILE)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.dir.join(METADATA_FILE)
    }
}

impl IndexStore for FileIndexStore {
    fn load(&self) -> Result<VectorIndex, StoreError> {
        let vectors_path = self.vectors_path();
        let metadata_path = self.metadata_path();

        match (vectors_path.exists(), metadata_path.exists()) {
            (false, false) => {
                tracing::debug!(dir = %self.dir.display(), "no persisted index, starting empty");
                return Ok(VectorIndex::new());
            }
            (true, false) => {
                return Err(StoreError::Corrupt(format!(
                    "{} exists but {} is missing",
                    VECTORS_FILE, METADATA_FILE
                )))
            }
            (false, true) => {
                return Err(StoreError::Corrupt(format!(
                    "{} exists but {} is missing",
                    METADATA_FILE, VECTORS_FILE
                )))
            }
            (true, true) => {}
        }

        let raw = fs::read(&vectors_path).map_err(io_err(&vectors_path))?;
        let (dims, data) = decode_vectors(&raw)?;

        let json = fs::read(&metadata_path).map_err(io_err(&metadata_path))?;
        let metadata: IndexMetadata = serde_json::from_slice(&json)
            .map_err(|e| StoreError::Corrupt(format!("{}: {}", METADATA_FILE, e)))?;

        let vectors = if dims == 0 { 0 } else { data.len() / dims };
        if vectors != metadata.entries.len() {
            return Err(StoreError::Corrupt(format!(
                "{} holds {} vectors but {} holds {} entries",
                VECTORS_FILE,
                vectors,
                METADATA_FILE,
                metadata.entries.len()
            )));
        }

        let index = VectorIndex::from_parts(dims, data, metadata)?;
        tracing::debug!(entries = index.len(), dims = index.dims(), "index loaded");
        Ok(index)
    }

    fn persist(&self, index: &VectorIndex) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).map_err(io_err(&self.dir))?;

        let vectors = encode_vectors(index)?;
        let metadata = serde_json::to_vec(index.metadata())
            .map_err(|e| StoreError::Corrupt(format!("cannot serialize metadata: {}", e)))?;

        let vectors_path = self.vectors_path();
        let metadata_path = self.metadata_path();
        let vectors_tmp = self.dir.join(format!("{}.tmp", VECTORS_FILE));
        let metadata_tmp = self.dir.join(format!("{}.tmp", METADATA_FILE));

        write_synced(&vectors_tmp, &vectors)?;
        write_synced(&metadata_tmp, &metadata)?;
        fs::rename(&vectors_tmp, &vectors_path).map_err(io_err(&vectors_path))?;
        fs::rename(&metadata_tmp, &metadata_path).map_err(io_err(&metadata_path))?;

        tracing::debug!(entries = index.len(), dir = %self.dir.display(), "index persisted");
        Ok(())
    }

    fn reset(&self) -> Result<(), StoreError> {
        for path in [self.vectors_path(), self.metadata_path()] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(io_err(&path)(e)),
            }
        }
        Ok(())
    }

    fn write_lock(&self) -> &Mutex<()> {
        &self.lock
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let mut file = File::create(path).map_err(io_err(path))?;
    file.write_all(bytes).map_err(io_err(path))?;
    file.sync_all().map_err(io_err(path))?;
    Ok(())
}

/// Serialize the vectors of `index` into the `vectors.bin` format.
pub fn encode_vectors(index: &VectorIndex) -> Result<Vec<u8>, StoreError> {
    let dims = u32::try_from(index.dims())
        .map_err(|_| StoreError::Corrupt("dimensionality exceeds u32".to_string()))?;
    let count = u32::try_from(index.len())
        .map_err(|_| StoreError::Corrupt("entry count exceeds u32".to_string()))?;

    let values = index.raw_vectors();
    let mut out = Vec::with_capacity(HEADER_LEN + values.len() * 4);
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&dims.to_le_bytes());
    out.extend_from_slice(&count.to_le_bytes());
    for &v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
    Ok(out)
}

/// Parse a `vectors.bin` buffer into `(dims, flat values)`.
pub fn decode_vectors(raw: &[u8]) -> Result<(usize, Vec<f32>), StoreError> {
    if raw.len() < HEADER_LEN {
        return Err(StoreError::Corrupt(format!(
            "{} is truncated ({} bytes)",
            VECTORS_FILE,
            raw.len()
        )));
    }
    if raw[0..4] != MAGIC {
        return Err(StoreError::Corrupt(format!("{} has a bad magic number", VECTORS_FILE)));
    }
    let version = u16::from_le_bytes([raw[4], raw[5]]);
    if version != FORMAT_VERSION {
        return Err(StoreError::Corrupt(format!(
            "{} has unsupported format version {}",
            VECTORS_FILE, version
        )));
    }
    let dims = u32::from_le_bytes([raw[6], raw[7], raw[8], raw[9]]) as usize;
    let count = u32::from_le_bytes([raw[10], raw[11], raw[12], raw[13]]) as usize;

    let body = &raw[HEADER_LEN..];
    let expected = count
        .checked_mul(dims)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| StoreError::Corrupt("vector header overflows".to_string()))?;
    if body.len() != expected {
        return Err(StoreError::Corrupt(format!(
            "{} declares {} vectors of {} dims but holds {} bytes of data",
            VECTORS_FILE,
            count,
            dims,
            body.len()
        )));
    }

    let data = body
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    Ok((dims, data))
}

// ============ In-memory store ============

/// Store that keeps the persisted index in memory, for tests and
/// embedding the pipeline without touching disk.
#[derive(Default)]
pub struct MemoryIndexStore {
    persisted: std::sync::Mutex<Option<VectorIndex>>,
    lock: Mutex<()>,
}

impl MemoryIndexStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IndexStore for MemoryIndexStore {
    fn load(&self) -> Result<VectorIndex, StoreError> {
        let guard = self
            .persisted
            .lock()
            .map_err(|_| StoreError::Corrupt("memory store lock poisoned".to_string()))?;
        Ok(guard.clone().unwrap_or_default())
    }

    fn persist(&self, index: &VectorIndex) -> Result<(), StoreError> {
        let mut guard = self
            .persisted
            .lock()
            .map_err(|_| StoreError::Corrupt("memory store lock poisoned".to_string()))?;
        *guard = Some(index.clone());
        Ok(())
    }

    fn reset(&self) -> Result<(), StoreError> {
        let mut guard = self
            .persisted
            .lock()
            .map_err(|_| StoreError::Corrupt("memory store lock poisoned".to_string()))?;
        *guard = None;
        Ok(())
    }

    fn write_lock(&self) -> &Mutex<()> {
        &self.lock
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docqa_core::models::Chunk;
    use tempfile::TempDir;

    fn sample_index() -> VectorIndex {
        let mut index = VectorIndex::new();
        index
            .add(vec![
                Chunk {
                    text: "alpha".into(),
                    source_hash: "h1".into(),
                    embedding: vec![1.0, 2.0, 3.0],
                },
                Chunk {
                    text: "beta".into(),
                    source_hash: "h1".into(),
                    embedding: vec![-1.0, 0.5, 0.25],
                },
            ])
            .unwrap();
        index.record_file("h1");
        index
    }

    #[test]
    fn test_missing_files_load_empty() {
        let tmp = TempDir::new().unwrap();
        let store = FileIndexStore::new(tmp.path().join("data"));
        let index = store.load().unwrap();
        assert!(index.is_empty());
        assert!(index.metadata().hashes.is_empty());
    }

    #[test]
    fn test_persist_then_load() {
        let tmp = TempDir::new().unwrap();
        let store = FileIndexStore::new(tmp.path().join("data"));
        store.persist(&sample_index()).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.dims(), 3);
        assert_eq!(loaded.raw_vectors(), sample_index().raw_vectors());
        assert_eq!(loaded.metadata(), sample_index().metadata());
        assert!(!tmp.path().join("data").join("vectors.bin.tmp").exists());
    }

    #[test]
    fn test_metadata_file_is_plain_json() {
        let tmp = TempDir::new().unwrap();
        let store = FileIndexStore::new(tmp.path());
        store.persist(&sample_index()).unwrap();
        let json: serde_json::Value =
            serde_json::from_slice(&fs::read(store.metadata_path()).unwrap()).unwrap();
        assert_eq!(json["hashes"], serde_json::json!(["h1"]));
        assert_eq!(json["entries"][1]["text"], "beta");
    }

    #[test]
    fn test_count_mismatch_is_corrupt() {
        let tmp = TempDir::new().unwrap();
        let store = FileIndexStore::new(tmp.path());
        store.persist(&sample_index()).unwrap();

        let mut meta = sample_index().metadata().clone();
        meta.entries.pop();
        fs::write(store.metadata_path(), serde_json::to_vec(&meta).unwrap()).unwrap();

        let err = store.load().unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)), "got {:?}", err);
        assert!(err.to_string().contains("2 vectors"));
    }

    #[test]
    fn test_one_file_missing_is_corrupt() {
        let tmp = TempDir::new().unwrap();
        let store = FileIndexStore::new(tmp.path());
        store.persist(&sample_index()).unwrap();
        fs::remove_file(store.vectors_path()).unwrap();
        assert!(matches!(store.load(), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn test_garbled_metadata_is_corrupt() {
        let tmp = TempDir::new().unwrap();
        let store = FileIndexStore::new(tmp.path());
        store.persist(&sample_index()).unwrap();
        fs::write(store.metadata_path(), b"{ not json").unwrap();
        assert!(matches!(store.load(), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn test_truncated_vectors_is_corrupt() {
        let encoded = encode_vectors(&sample_index()).unwrap();
        let err = decode_vectors(&encoded[..encoded.len() - 2]).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
        assert!(decode_vectors(b"DQ").is_err());
    }

    #[test]
    fn test_bad_magic_is_corrupt() {
        let mut encoded = encode_vectors(&sample_index()).unwrap();
        encoded[0] = b'X';
        assert!(matches!(decode_vectors(&encoded), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn test_empty_index_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let store = FileIndexStore::new(tmp.path());
        store.persist(&VectorIndex::new()).unwrap();
        let loaded = store.load().unwrap();
        assert!(loaded.is_empty());
        assert_eq!(loaded.dims(), 0);
    }

    #[tokio::test]
    async fn test_blocking_helpers_round_trip_on_disk() {
        let tmp = TempDir::new().unwrap();
        let store: Arc<dyn IndexStore> = Arc::new(FileIndexStore::new(tmp.path().join("data")));

        let written = persist_blocking(&store, sample_index()).await.unwrap();
        assert_eq!(written.len(), 2);

        let loaded = load_blocking(&store).await.unwrap();
        assert_eq!(loaded.raw_vectors(), sample_index().raw_vectors());
        assert_eq!(loaded.metadata(), sample_index().metadata());
    }

    #[tokio::test]
    async fn test_blocking_load_reports_corruption() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(VECTORS_FILE), b"garbage").unwrap();
        fs::write(tmp.path().join(METADATA_FILE), b"{}").unwrap();
        let store: Arc<dyn IndexStore> = Arc::new(FileIndexStore::new(tmp.path()));
        assert!(matches!(
            load_blocking(&store).await,
            Err(StoreError::Corrupt(_))
        ));
    }

    #[test]
    fn test_reset_removes_files() {
        let tmp = TempDir::new().unwrap();
        let store = FileIndexStore::new(tmp.path());
        store.persist(&sample_index()).unwrap();
        store.reset().unwrap();
        store.reset().unwrap();
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryIndexStore::new();
        assert!(store.load().unwrap().is_empty());
        store.persist(&sample_index()).unwrap();
        assert_eq!(store.load().unwrap().len(), 2);
        store.reset().unwrap();
        assert!(store.load().unwrap().is_empty());
    }
}
