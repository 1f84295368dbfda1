//! Persistent cosine index on usearch's HNSW graph.
//!
//! One index file per collection directory. The reservation doubles whenever
//! the graph fills up, so the configured capacity is only a starting point.

use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use refresh_embeddings::Embedding;
use tracing::{debug, info};
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

use crate::error::VectorError;
use crate::index::{IndexStats, VectorIndex};

pub const INDEX_FILE: &str = "hnsw.usearch";

const CONNECTIVITY: usize = 16;
const EXPANSION_ADD: usize = 200;
const EXPANSION_SEARCH: usize = 100;
const MIN_GROWTH: usize = 1024;

#[derive(Debug, Clone)]
pub struct HnswConfig {
    pub dimension: usize,
    /// Collection directory the index file is written into
    pub dir: PathBuf,
    pub capacity: usize,
}

impl HnswConfig {
    pub fn new(dimension: usize, dir: impl Into<PathBuf>) -> Self {
        Self {
            dimension,
            dir: dir.into(),
            capacity: 100_000,
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }
}

fn index_err<E: std::fmt::Display>(context: &'static str) -> impl FnOnce(E) -> VectorError {
    move |e| VectorError::Index(format!("{context}: {e}"))
}

fn utf8(path: &Path) -> Result<&str, VectorError> {
    path.to_str()
        .ok_or_else(|| VectorError::Index(format!("non-UTF-8 index path {}", path.display())))
}

pub struct HnswIndex {
    graph: RwLock<Index>,
    dimension: usize,
    file: PathBuf,
}

impl HnswIndex {
    /// Load `<dir>/hnsw.usearch` if present, otherwise start an empty graph.
    ///
    /// A file built for a different dimension is rejected.
    pub fn open_or_create(config: HnswConfig) -> Result<Self, VectorError> {
        let options = IndexOptions {
            dimensions: config.dimension,
            metric: MetricKind::Cos,
            quantization: ScalarKind::F32,
            connectivity: CONNECTIVITY,
            expansion_add: EXPANSION_ADD,
            expansion_search: EXPANSION_SEARCH,
            multi: false,
        };
        let graph = Index::new(&options).map_err(index_err("create"))?;
        let file = config.dir.join(INDEX_FILE);

        if file.exists() {
            graph.load(utf8(&file)?).map_err(index_err("load"))?;
            if graph.dimensions() != config.dimension {
                return Err(VectorError::DimensionMismatch {
                    expected: graph.dimensions(),
                    actual: config.dimension,
                });
            }
            info!(file = %file.display(), vectors = graph.size(), "Loaded vector index");
        } else {
            std::fs::create_dir_all(&config.dir)?;
            graph
                .reserve(config.capacity.max(1))
                .map_err(index_err("reserve"))?;
            info!(file = %file.display(), dimension = config.dimension, "New vector index");
        }

        Ok(Self {
            graph: RwLock::new(graph),
            dimension: config.dimension,
            file,
        })
    }

    pub fn index_file(&self) -> &Path {
        &self.file
    }

    fn graph(&self) -> RwLockReadGuard<'_, Index> {
        self.graph.read().unwrap_or_else(|e| e.into_inner())
    }

    fn graph_mut(&self) -> RwLockWriteGuard<'_, Index> {
        self.graph.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl VectorIndex for HnswIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn len(&self) -> usize {
        self.graph().size()
    }

    fn add(&mut self, id: u64, embedding: &Embedding) -> Result<(), VectorError> {
        if embedding.dimension() != self.dimension {
            return Err(VectorError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.dimension(),
            });
        }

        let graph = self.graph_mut();
        let capacity = graph.capacity();
        if graph.size() >= capacity {
            let target = (capacity * 2).max(MIN_GROWTH);
            debug!(from = capacity, to = target, "Growing vector index");
            graph.reserve(target).map_err(index_err("reserve"))?;
        }
        graph.add(id, &embedding.values).map_err(index_err("add"))
    }

    fn remove(&mut self, id: u64) -> Result<bool, VectorError> {
        let n = self.graph_mut().remove(id).map_err(index_err("remove"))?;
        Ok(n > 0)
    }

    fn contains(&self, id: u64) -> bool {
        self.graph().contains(id)
    }

    fn stats(&self) -> IndexStats {
        IndexStats {
            vector_count: self.len(),
            dimension: self.dimension,
            size_bytes: std::fs::metadata(&self.file).map(|m| m.len()).unwrap_or(0),
        }
    }

    fn save(&self) -> Result<(), VectorError> {
        let graph = self.graph();
        graph.save(utf8(&self.file)?).map_err(index_err("save"))?;
        debug!(file = %self.file.display(), vectors = graph.size(), "Saved vector index");
        Ok(())
    }
}
