//! # refresh-workspace
//!
//! Materializes a local, fully populated directory tree for a repository
//! reference and removes it again once the pipeline is done with it.
//!
//! ## Features
//! - `WorkspaceProvider` trait: the seam the pipeline depends on
//! - `GitWorkspaceProvider`: git2 clone into `<root>/<slug>-<ulid>`
//! - Every fetch gets a fresh directory, so concurrent runs never share one

pub mod error;
pub mod git;
pub mod provider;

pub use error::{CleanupError, FetchError};
pub use git::{GitWorkspaceConfig, GitWorkspaceProvider};
pub use provider::WorkspaceProvider;
