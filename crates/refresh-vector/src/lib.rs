//! # refresh-vector
//!
//! Named vector collections for ingested repository chunks.
//!
//! A collection lives at `<persist_directory>/<collection_name>` and holds an
//! HNSW index (via usearch) plus per-chunk metadata in RocksDB. A
//! process-local in-memory backend is available for dry runs and tests.
//!
//! ## Features
//! - Upsert keyed by stable chunk ids, so re-ingesting unchanged content is a no-op
//! - One shared handle per collection, safe for concurrent ingests
//! - Removal of chunks a repository no longer produces

pub mod collection;
pub mod error;
pub mod hnsw;
pub mod index;
pub mod metadata;
pub mod store;

pub use collection::{Collection, UpsertStats};
pub use error::VectorError;
pub use hnsw::{HnswConfig, HnswIndex};
pub use index::{FlatIndex, IndexStats, VectorIndex};
pub use metadata::{ChunkEntry, MemoryMetadata, MetadataStore, VectorMetadata, CF_CHUNK_META};
pub use store::VectorStore;
