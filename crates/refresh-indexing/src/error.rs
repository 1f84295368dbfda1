//! Ingest error types.

use refresh_embeddings::EmbeddingError;
use refresh_vector::VectorError;
use thiserror::Error;

/// Errors that can occur while ingesting a workspace.
#[derive(Debug, Error)]
pub enum IngestError {
    /// IO error reading source files
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Directory traversal failed
    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),

    /// Embedding computation failed
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    /// Vector store write failed
    #[error("Vector store error: {0}")]
    Vector(#[from] VectorError),

    /// Blocking task panicked or was cancelled
    #[error("Ingest task failed: {0}")]
    Task(String),

    /// The caller stopped waiting; the run quit before its next write
    #[error("Ingest abandoned")]
    Abandoned,
}
