//! # refresh-indexing
//!
//! Turns a fetched workspace into vector collection entries:
//! walk → chunk → embed → upsert, then prune chunks the repository no longer
//! produces.

pub mod chunker;
pub mod error;
pub mod indexer;
pub mod languages;
pub mod walker;

pub use chunker::{chunk_id, chunk_source, content_hash, Chunk, ChunkerConfig};
pub use error::IngestError;
pub use indexer::{CodeIndexer, IndexerConfig, Indexer, IngestReport};
pub use languages::{is_indexable, is_skipped_dir};
pub use walker::{read_source, walk_workspace, SourceFile};
