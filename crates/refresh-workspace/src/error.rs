//! Workspace error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that prevent a workspace from being materialized.
///
/// All variants are treated as transient by the pipeline and retried.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Clone failed (network, auth, repository not found)
    #[error("Clone of {reference} failed: {reason}")]
    Clone { reference: String, reason: String },

    /// Workspace directory could not be prepared
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Blocking clone task did not complete
    #[error("Clone task failed: {0}")]
    Task(String),
}

/// Errors removing a workspace. Never fatal to a pipeline run.
#[derive(Debug, Error)]
pub enum CleanupError {
    /// Nothing exists at the path
    #[error("Workspace does not exist: {0}")]
    Missing(PathBuf),

    /// Refusing to remove a path the provider does not own
    #[error("Workspace {path} is outside workspace root {root}")]
    OutsideRoot { path: PathBuf, root: PathBuf },

    /// Removal failed part way
    #[error("Failed to remove {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
