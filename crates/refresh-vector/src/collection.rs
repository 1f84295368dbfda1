//! A named vector collection: index plus chunk metadata.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use refresh_embeddings::Embedding;
use refresh_types::CollectionTarget;
use tracing::{debug, info};

use crate::error::VectorError;
use crate::index::VectorIndex;
use crate::metadata::{ChunkEntry, MetadataStore};

/// Counts from one [`Collection::upsert`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertStats {
    pub inserted: usize,
    pub replaced: usize,
}

/// One collection shared by every ingest that targets it.
///
/// Index and metadata are updated together under a single lock, so an id is
/// never present in one without the other once a call returns.
pub struct Collection {
    target: CollectionTarget,
    dimension: usize,
    index: Mutex<Box<dyn VectorIndex>>,
    metadata: Box<dyn MetadataStore>,
}

impl Collection {
    pub fn new(
        target: CollectionTarget,
        index: Box<dyn VectorIndex>,
        metadata: Box<dyn MetadataStore>,
    ) -> Self {
        Self {
            target,
            dimension: index.dimension(),
            index: Mutex::new(index),
            metadata,
        }
    }

    pub fn target(&self) -> &CollectionTarget {
        &self.target
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn lock(&self) -> MutexGuard<'_, Box<dyn VectorIndex>> {
        self.index.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of vectors stored.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Metadata for a stored chunk.
    pub fn entry(&self, vector_id: u64) -> Result<Option<ChunkEntry>, VectorError> {
        self.metadata.get(vector_id)
    }

    /// True when `vector_id` is stored with exactly `content_hash`.
    pub fn is_current(&self, vector_id: u64, content_hash: &str) -> Result<bool, VectorError> {
        let index = self.lock();
        if !index.contains(vector_id) {
            return Ok(false);
        }
        Ok(self
            .metadata
            .get(vector_id)?
            .is_some_and(|e| e.content_hash == content_hash))
    }

    /// Insert or replace chunks. Existing ids are overwritten in place.
    pub fn upsert(&self, items: Vec<(ChunkEntry, Embedding)>) -> Result<UpsertStats, VectorError> {
        let mut stats = UpsertStats::default();
        if items.is_empty() {
            return Ok(stats);
        }

        let mut index = self.lock();
        for (entry, embedding) in items {
            if embedding.dimension() != self.dimension {
                return Err(VectorError::DimensionMismatch {
                    expected: self.dimension,
                    actual: embedding.dimension(),
                });
            }

            let replaced = index.remove(entry.vector_id)?;
            index.add(entry.vector_id, &embedding)?;
            self.metadata.put(&entry)?;

            if replaced {
                stats.replaced += 1;
            } else {
                stats.inserted += 1;
            }
        }

        debug!(
            collection = %self.target,
            inserted = stats.inserted,
            replaced = stats.replaced,
            "Upserted chunks"
        );
        Ok(stats)
    }

    /// Remove every chunk of `repository` whose id is not in `keep`.
    pub fn remove_stale(
        &self,
        repository: &str,
        keep: &HashSet<u64>,
    ) -> Result<usize, VectorError> {
        let mut index = self.lock();
        let mut removed = 0;

        for id in self.metadata.ids_for_repository(repository)? {
            if keep.contains(&id) {
                continue;
            }
            index.remove(id)?;
            self.metadata.delete(id)?;
            removed += 1;
        }

        if removed > 0 {
            info!(collection = %self.target, repo = repository, removed, "Removed stale chunks");
        }
        Ok(removed)
    }

    /// Persist the index.
    pub fn flush(&self) -> Result<(), VectorError> {
        self.lock().save()
    }
}
