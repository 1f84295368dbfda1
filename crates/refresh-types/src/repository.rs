//! Repository references, workspaces and collection targets.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Opaque identifier of a remote code repository (usually a clone URL).
///
/// References are compared verbatim. Duplicates in a reference list are
/// processed as independent runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepositoryReference(String);

impl RepositoryReference {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Filesystem-safe short name derived from the last path segment.
    ///
    /// Only used as a readable prefix for workspace directories, never as an
    /// identity: two references can share a slug.
    pub fn slug(&self) -> String {
        let trimmed = self.0.trim().trim_end_matches('/');
        let last = trimmed
            .rsplit(['/', ':', '\\'])
            .next()
            .unwrap_or(trimmed);
        let last = last.strip_suffix(".git").unwrap_or(last);

        let slug: String = last
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '-'
                }
            })
            .collect();
        let slug = slug.trim_matches(|c| c == '.' || c == '-');

        if slug.is_empty() {
            "repo".to_string()
        } else {
            slug.to_string()
        }
    }
}

impl fmt::Display for RepositoryReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RepositoryReference {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for RepositoryReference {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Where ingested units are written: a collection inside a persist directory.
///
/// Constant for every repository of one cycle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollectionTarget {
    /// Root directory of the vector store
    pub persist_directory: PathBuf,
    /// Named collection within the store
    pub collection_name: String,
}

impl CollectionTarget {
    pub fn new(persist_directory: impl Into<PathBuf>, collection_name: impl Into<String>) -> Self {
        Self {
            persist_directory: persist_directory.into(),
            collection_name: collection_name.into(),
        }
    }

    /// Directory holding this collection's files.
    pub fn collection_dir(&self) -> PathBuf {
        self.persist_directory.join(&self.collection_name)
    }
}

impl fmt::Display for CollectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}",
            self.collection_name,
            self.persist_directory.display()
        )
    }
}

/// A materialized local copy of one repository, owned by a single pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    reference: RepositoryReference,
    path: PathBuf,
}

impl Workspace {
    pub fn new(reference: RepositoryReference, path: impl Into<PathBuf>) -> Self {
        Self {
            reference,
            path: path.into(),
        }
    }

    /// The repository this workspace was fetched for.
    pub fn reference(&self) -> &RepositoryReference {
        &self.reference
    }

    /// Root of the directory tree.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
