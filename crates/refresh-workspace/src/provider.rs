//! Workspace provider trait.

use async_trait::async_trait;

use refresh_types::{RepositoryReference, Workspace};

use crate::error::{CleanupError, FetchError};

/// Turns repository references into local directory trees and back.
///
/// Implementations must be safe to call concurrently for different
/// references: no mutable state may be shared between two `fetch` calls.
#[async_trait]
pub trait WorkspaceProvider: Send + Sync {
    /// Materialize a full local copy of `reference` in a directory no other
    /// run uses.
    async fn fetch(&self, reference: &RepositoryReference) -> Result<Workspace, FetchError>;

    /// Recursively remove everything at the workspace path.
    async fn destroy(&self, workspace: &Workspace) -> Result<(), CleanupError>;
}
