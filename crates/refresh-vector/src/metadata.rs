//! Chunk metadata storage.
//!
//! Maps vector ids (u64) to the chunk they were computed from. The content
//! hash lets the indexer skip chunks whose text has not changed.

use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, DB};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::VectorError;

/// Column family name for chunk metadata
pub const CF_CHUNK_META: &str = "chunk_meta";

const MAX_PREVIEW: usize = 200;

/// Metadata for one stored chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkEntry {
    /// Key in the vector index
    pub vector_id: u64,
    /// Repository reference the chunk came from
    pub repository: String,
    /// Path relative to the workspace root, `/`-separated
    pub path: String,
    /// Position of the chunk within its file
    pub chunk_index: u32,
    /// First line (1-based, inclusive)
    pub start_line: u32,
    /// Last line (1-based, inclusive)
    pub end_line: u32,
    /// blake3 hex digest of the chunk text
    pub content_hash: String,
    /// Timestamp when the chunk was stored (ms since epoch)
    pub indexed_at: i64,
    /// Leading text of the chunk
    pub text_preview: String,
}

impl ChunkEntry {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        vector_id: u64,
        repository: impl Into<String>,
        path: impl Into<String>,
        chunk_index: u32,
        start_line: u32,
        end_line: u32,
        content_hash: impl Into<String>,
        text: &str,
    ) -> Self {
        Self {
            vector_id,
            repository: repository.into(),
            path: path.into(),
            chunk_index,
            start_line,
            end_line,
            content_hash: content_hash.into(),
            indexed_at: chrono::Utc::now().timestamp_millis(),
            text_preview: preview(text),
        }
    }
}

fn preview(text: &str) -> String {
    match text.char_indices().nth(MAX_PREVIEW) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Storage for [`ChunkEntry`] records.
pub trait MetadataStore: Send + Sync {
    /// Insert or replace an entry.
    fn put(&self, entry: &ChunkEntry) -> Result<(), VectorError>;

    /// Get an entry by vector id.
    fn get(&self, vector_id: u64) -> Result<Option<ChunkEntry>, VectorError>;

    /// Delete an entry. Deleting a missing id is not an error.
    fn delete(&self, vector_id: u64) -> Result<(), VectorError>;

    /// All vector ids stored for a repository.
    fn ids_for_repository(&self, repository: &str) -> Result<Vec<u64>, VectorError>;

    /// Count total entries
    fn count(&self) -> Result<usize, VectorError>;
}

/// Chunk metadata storage using RocksDB.
pub struct VectorMetadata {
    db: DB,
}

impl VectorMetadata {
    /// Open or create metadata storage.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, VectorError> {
        let path = path.as_ref();

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf = ColumnFamilyDescriptor::new(CF_CHUNK_META, Options::default());
        let db = DB::open_cf_descriptors(&opts, path, vec![cf])?;

        info!(path = ?path, "Opened chunk metadata storage");
        Ok(Self { db })
    }

    fn cf(&self) -> Result<&ColumnFamily, VectorError> {
        self.db
            .cf_handle(CF_CHUNK_META)
            .ok_or_else(|| VectorError::Index(format!("column family {} missing", CF_CHUNK_META)))
    }

    fn entries(&self) -> Result<Vec<ChunkEntry>, VectorError> {
        let mut entries = Vec::new();
        for item in self.db.iterator_cf(self.cf()?, IteratorMode::Start) {
            let (_, value) = item?;
            entries.push(serde_json::from_slice(&value)?);
        }
        Ok(entries)
    }
}

impl MetadataStore for VectorMetadata {
    fn put(&self, entry: &ChunkEntry) -> Result<(), VectorError> {
        let value = serde_json::to_vec(entry)?;
        self.db
            .put_cf(self.cf()?, entry.vector_id.to_be_bytes(), value)?;
        debug!(vector_id = entry.vector_id, path = %entry.path, "Stored metadata");
        Ok(())
    }

    fn get(&self, vector_id: u64) -> Result<Option<ChunkEntry>, VectorError> {
        match self.db.get_cf(self.cf()?, vector_id.to_be_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn delete(&self, vector_id: u64) -> Result<(), VectorError> {
        self.db.delete_cf(self.cf()?, vector_id.to_be_bytes())?;
        Ok(())
    }

    fn ids_for_repository(&self, repository: &str) -> Result<Vec<u64>, VectorError> {
        Ok(self
            .entries()?
            .into_iter()
            .filter(|e| e.repository == repository)
            .map(|e| e.vector_id)
            .collect())
    }

    fn count(&self) -> Result<usize, VectorError> {
        Ok(self
            .db
            .iterator_cf(self.cf()?, IteratorMode::Start)
            .count())
    }
}

/// Process-local metadata storage.
#[derive(Default)]
pub struct MemoryMetadata {
    entries: RwLock<HashMap<u64, ChunkEntry>>,
}

impl MemoryMetadata {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetadataStore for MemoryMetadata {
    fn put(&self, entry: &ChunkEntry) -> Result<(), VectorError> {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(entry.vector_id, entry.clone());
        Ok(())
    }

    fn get(&self, vector_id: u64) -> Result<Option<ChunkEntry>, VectorError> {
        Ok(self
            .entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&vector_id)
            .cloned())
    }

    fn delete(&self, vector_id: u64) -> Result<(), VectorError> {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&vector_id);
        Ok(())
    }

    fn ids_for_repository(&self, repository: &str) -> Result<Vec<u64>, VectorError> {
        Ok(self
            .entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|e| e.repository == repository)
            .map(|e| e.vector_id)
            .collect())
    }

    fn count(&self) -> Result<usize, VectorError> {
        Ok(self.entries.read().unwrap_or_else(|e| e.into_inner()).len())
    }
}
