//! Registry of open collections.
//!
//! Every ingest that names the same [`CollectionTarget`] gets the same
//! [`Collection`] handle. A collection directory records its dimension in
//! `collection.json`; opening it with a different model dimension fails.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use refresh_types::{CollectionTarget, VectorBackend, VectorStoreSettings};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::collection::Collection;
use crate::error::VectorError;
use crate::hnsw::{HnswConfig, HnswIndex};
use crate::index::FlatIndex;
use crate::metadata::{MemoryMetadata, VectorMetadata};

const MANIFEST_FILE: &str = "collection.json";
const METADATA_DIR: &str = "metadata";

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    dimension: usize,
}

/// Opens and caches collections.
pub struct VectorStore {
    backend: VectorBackend,
    capacity: usize,
    collections: Mutex<HashMap<CollectionTarget, Arc<Collection>>>,
}

impl VectorStore {
    pub fn new(backend: VectorBackend, capacity: usize) -> Self {
        Self {
            backend,
            capacity,
            collections: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_settings(settings: &VectorStoreSettings) -> Self {
        Self::new(settings.backend, settings.capacity)
    }

    /// Process-local store, used for dry runs and tests.
    pub fn in_memory() -> Self {
        Self::new(VectorBackend::Memory, 0)
    }

    pub fn backend(&self) -> VectorBackend {
        self.backend
    }

    /// Number of collections opened so far.
    pub fn open_collections(&self) -> usize {
        self.collections
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Get the collection for `target`, opening or creating it on first use.
    pub fn collection(
        &self,
        target: &CollectionTarget,
        dimension: usize,
    ) -> Result<Arc<Collection>, VectorError> {
        let mut collections = self.collections.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(existing) = collections.get(target) {
            if existing.dimension() != dimension {
                return Err(VectorError::DimensionMismatch {
                    expected: existing.dimension(),
                    actual: dimension,
                });
            }
            return Ok(Arc::clone(existing));
        }

        let collection = Arc::new(self.open(target, dimension)?);
        collections.insert(target.clone(), Arc::clone(&collection));
        Ok(collection)
    }

    fn open(&self, target: &CollectionTarget, dimension: usize) -> Result<Collection, VectorError> {
        match self.backend {
            VectorBackend::Memory => Ok(Collection::new(
                target.clone(),
                Box::new(FlatIndex::new(dimension)),
                Box::new(MemoryMetadata::new()),
            )),
            VectorBackend::Usearch => {
                let dir = target.collection_dir();
                std::fs::create_dir_all(&dir)?;
                check_manifest(&dir, dimension)?;

                let index = HnswIndex::open_or_create(
                    HnswConfig::new(dimension, &dir).with_capacity(self.capacity),
                )?;
                let metadata = VectorMetadata::open(dir.join(METADATA_DIR))?;

                info!(collection = %target, dim = dimension, "Opened collection");
                Ok(Collection::new(
                    target.clone(),
                    Box::new(index),
                    Box::new(metadata),
                ))
            }
        }
    }
}

fn check_manifest(dir: &Path, dimension: usize) -> Result<(), VectorError> {
    let path = dir.join(MANIFEST_FILE);
    if path.exists() {
        let manifest: Manifest = serde_json::from_slice(&std::fs::read(&path)?)?;
        if manifest.dimension != dimension {
            return Err(VectorError::DimensionMismatch {
                expected: manifest.dimension,
                actual: dimension,
            });
        }
        return Ok(());
    }
    std::fs::write(&path, serde_json::to_vec_pretty(&Manifest { dimension })?)?;
    Ok(())
}
