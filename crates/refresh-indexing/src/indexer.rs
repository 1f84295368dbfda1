//! Workspace ingestion: walk → chunk → embed → upsert → prune.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use async_trait::async_trait;
use refresh_embeddings::EmbeddingModel;
use refresh_types::{CollectionTarget, Settings, Workspace};
use refresh_vector::{ChunkEntry, Collection, VectorStore};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::chunker::{chunk_id, chunk_source, content_hash, ChunkerConfig};
use crate::error::IngestError;
use crate::walker::{read_source, walk_workspace};

/// Summary of one ingest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub files_scanned: usize,
    pub files_indexed: usize,
    pub chunks_upserted: usize,
    pub chunks_unchanged: usize,
    pub chunks_removed: usize,
    pub duration_ms: u64,
}

/// Ingests a workspace into a collection.
///
/// Calls for different workspaces may run concurrently against the same
/// target; implementations own the write-safety of the shared collection.
#[async_trait]
pub trait Indexer: Send + Sync {
    async fn ingest(
        &self,
        workspace: &Workspace,
        target: &CollectionTarget,
    ) -> Result<IngestReport, IngestError>;
}

/// Indexer configuration.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    pub chunker: ChunkerConfig,
    /// Chunks per embedding call
    pub batch_size: usize,
    /// Larger files are skipped
    pub max_file_bytes: u64,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            chunker: ChunkerConfig::default(),
            batch_size: 32,
            max_file_bytes: 1024 * 1024,
        }
    }
}

impl IndexerConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            chunker: ChunkerConfig::from(&settings.chunking),
            batch_size: settings.embeddings.batch_size,
            max_file_bytes: settings.chunking.max_file_bytes,
        }
    }
}

/// Line-window code indexer over an embedding model and a vector store.
pub struct CodeIndexer {
    embedder: Arc<dyn EmbeddingModel>,
    store: Arc<VectorStore>,
    config: IndexerConfig,
}

impl CodeIndexer {
    pub fn new(
        embedder: Arc<dyn EmbeddingModel>,
        store: Arc<VectorStore>,
        config: IndexerConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            config,
        }
    }

    pub fn store(&self) -> &Arc<VectorStore> {
        &self.store
    }
}

#[async_trait]
impl Indexer for CodeIndexer {
    async fn ingest(
        &self,
        workspace: &Workspace,
        target: &CollectionTarget,
    ) -> Result<IngestReport, IngestError> {
        let gate = Arc::new(WriteGate::default());
        let run = IngestRun {
            embedder: Arc::clone(&self.embedder),
            store: Arc::clone(&self.store),
            config: self.config.clone(),
            workspace: workspace.clone(),
            target: target.clone(),
            gate: Arc::clone(&gate),
        };

        // Dropping this future (attempt timeout, cancellation) closes the gate
        let mut guard = AbandonOnDrop(Some(gate));
        let result = tokio::task::spawn_blocking(move || run.execute()).await;
        guard.0 = None;

        result.map_err(|e| IngestError::Task(e.to_string()))?
    }
}

/// Stops a blocking ingest whose caller has gone away.
///
/// Collection writes run while holding the lock, so once [`WriteGate::abandon`]
/// returns no further write to the collection can start.
#[derive(Debug, Default)]
struct WriteGate {
    abandoned: Mutex<bool>,
}

impl WriteGate {
    fn lock(&self) -> MutexGuard<'_, bool> {
        self.abandoned.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check(&self) -> Result<(), IngestError> {
        if *self.lock() {
            return Err(IngestError::Abandoned);
        }
        Ok(())
    }

    fn write<T>(&self, op: impl FnOnce() -> Result<T, IngestError>) -> Result<T, IngestError> {
        let abandoned = self.lock();
        if *abandoned {
            return Err(IngestError::Abandoned);
        }
        op()
    }

    /// Waits for a write in progress, if any.
    fn abandon(&self) {
        *self.lock() = true;
    }
}

struct AbandonOnDrop(Option<Arc<WriteGate>>);

impl Drop for AbandonOnDrop {
    fn drop(&mut self) {
        if let Some(gate) = self.0.take() {
            gate.abandon();
            debug!("Ingest abandoned");
        }
    }
}

/// Owned state for one ingest on a blocking thread.
struct IngestRun {
    embedder: Arc<dyn EmbeddingModel>,
    store: Arc<VectorStore>,
    config: IndexerConfig,
    workspace: Workspace,
    target: CollectionTarget,
    gate: Arc<WriteGate>,
}

impl IngestRun {
    fn execute(self) -> Result<IngestReport, IngestError> {
        let start = Instant::now();
        let mut report = IngestReport::default();
        let reference = self.workspace.reference().as_str();

        self.gate.check()?;
        let collection = self
            .store
            .collection(&self.target, self.embedder.info().dimension)?;

        let files = walk_workspace(self.workspace.path(), self.config.max_file_bytes)?;
        info!(repo = reference, files = files.len(), collection = %self.target, "Ingest started");

        let batch_size = self.config.batch_size.max(1);
        let mut seen: HashSet<u64> = HashSet::new();
        let mut pending: Vec<(ChunkEntry, String)> = Vec::with_capacity(batch_size);

        for file in &files {
            self.gate.check()?;
            report.files_scanned += 1;
            let Some(source) = read_source(&file.absolute)? else {
                continue;
            };

            let chunks = chunk_source(&source, &self.config.chunker);
            if chunks.is_empty() {
                continue;
            }
            report.files_indexed += 1;

            for chunk in chunks {
                let id = chunk_id(reference, &file.relative, chunk.index);
                let hash = content_hash(&chunk.text);
                seen.insert(id);

                if collection.is_current(id, &hash)? {
                    report.chunks_unchanged += 1;
                    continue;
                }

                let entry = ChunkEntry::new(
                    id,
                    reference,
                    file.relative.clone(),
                    chunk.index,
                    chunk.start_line,
                    chunk.end_line,
                    hash,
                    &chunk.text,
                );
                pending.push((entry, chunk.text));

                if pending.len() >= batch_size {
                    report.chunks_upserted += self.write_batch(&collection, &mut pending)?;
                }
            }
        }
        report.chunks_upserted += self.write_batch(&collection, &mut pending)?;

        report.chunks_removed = self.gate.write(|| {
            let removed = collection.remove_stale(reference, &seen)?;
            collection.flush()?;
            Ok(removed)
        })?;

        report.duration_ms = start.elapsed().as_millis().try_into().unwrap_or(u64::MAX);
        info!(
            repo = reference,
            scanned = report.files_scanned,
            upserted = report.chunks_upserted,
            unchanged = report.chunks_unchanged,
            removed = report.chunks_removed,
            duration_ms = report.duration_ms,
            "Ingest complete"
        );
        Ok(report)
    }

    fn write_batch(
        &self,
        collection: &Collection,
        pending: &mut Vec<(ChunkEntry, String)>,
    ) -> Result<usize, IngestError> {
        if pending.is_empty() {
            return Ok(0);
        }

        let (entries, texts): (Vec<ChunkEntry>, Vec<String>) = pending.drain(..).unzip();
        let embeddings = self.embedder.embed_texts(&texts)?;
        let count = entries.len();

        self.gate
            .write(|| Ok(collection.upsert(entries.into_iter().zip(embeddings).collect())?))?;
        debug!(count, "Wrote chunk batch");
        Ok(count)
    }
}
