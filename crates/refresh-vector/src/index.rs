//! The vector index seam and a memory-only implementation for tests and
//! ephemeral collections.

use std::collections::HashMap;

use refresh_embeddings::Embedding;

use crate::error::VectorError;

#[derive(Debug, Clone, Default)]
pub struct IndexStats {
    pub vector_count: usize,
    pub dimension: usize,
    /// On-disk size; 0 when nothing has been saved
    pub size_bytes: u64,
}

/// Id-keyed storage of fixed-width vectors.
///
/// Mutation takes `&mut self`. [`Collection`](crate::Collection) owns the
/// index behind a mutex and is the only writer.
pub trait VectorIndex: Send + Sync {
    fn dimension(&self) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fails with `DimensionMismatch` when the width is wrong.
    fn add(&mut self, id: u64, embedding: &Embedding) -> Result<(), VectorError>;

    /// `Ok(false)` when `id` was not stored.
    fn remove(&mut self, id: u64) -> Result<bool, VectorError>;

    fn contains(&self, id: u64) -> bool;

    fn stats(&self) -> IndexStats;

    /// Flush to disk. A no-op for memory-only indexes.
    fn save(&self) -> Result<(), VectorError>;
}

/// Brute-force in-memory index. Nothing is persisted.
pub struct FlatIndex {
    dimension: usize,
    vectors: HashMap<u64, Embedding>,
}

impl FlatIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: HashMap::new(),
        }
    }

    pub fn get(&self, id: u64) -> Option<&Embedding> {
        self.vectors.get(&id)
    }
}

impl VectorIndex for FlatIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn add(&mut self, id: u64, embedding: &Embedding) -> Result<(), VectorError> {
        if embedding.dimension() != self.dimension {
            return Err(VectorError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.dimension(),
            });
        }
        self.vectors.insert(id, embedding.clone());
        Ok(())
    }

    fn remove(&mut self, id: u64) -> Result<bool, VectorError> {
        Ok(self.vectors.remove(&id).is_some())
    }

    fn contains(&self, id: u64) -> bool {
        self.vectors.contains_key(&id)
    }

    fn stats(&self) -> IndexStats {
        IndexStats {
            vector_count: self.vectors.len(),
            dimension: self.dimension,
            size_bytes: 0,
        }
    }

    fn save(&self) -> Result<(), VectorError> {
        Ok(())
    }
}
