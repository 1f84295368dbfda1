//! # refresh-types
//!
//! Shared domain types for the repository refresh system.
//!
//! This crate defines the data structures passed between the pipeline stages:
//! - Repository references and the workspaces materialized for them
//! - The collection target every ingest of a cycle writes into
//! - Pipeline stages, states and terminal outcomes
//! - Settings: layered process configuration
//!
//! ## Usage
//!
//! ```rust
//! use refresh_types::{CollectionTarget, RepositoryReference};
//!
//! let reference = RepositoryReference::new("https://github.com/Bessouat40/RAGLight");
//! let target = CollectionTarget::new("./chroma_db", "github_repos");
//! assert_eq!(reference.slug(), "RAGLight");
//! assert!(target.collection_dir().ends_with("github_repos"));
//! ```

pub mod config;
pub mod error;
pub mod outcome;
pub mod repository;

pub use config::{
    ChunkingSettings, EmbeddingSettings, GitSettings, OverlapPolicy, RetrySettings, Settings,
    StageRetrySettings, TriggerSettings, VectorBackend, VectorStoreSettings,
};
pub use error::RefreshError;
pub use outcome::{PipelineOutcome, PipelineState, Stage};
pub use repository::{CollectionTarget, RepositoryReference, Workspace};
