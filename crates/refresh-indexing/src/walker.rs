//! Workspace traversal.

use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::error::IngestError;
use crate::languages::{is_indexable, is_skipped_dir};

/// A file selected for ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub absolute: PathBuf,
    /// Path relative to the workspace root, `/`-separated
    pub relative: String,
}

fn keep_entry(entry: &DirEntry) -> bool {
    // The workspace root itself may live under a hidden directory
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return true;
    }
    entry
        .file_name()
        .to_str()
        .is_some_and(|name| !is_skipped_dir(name))
}

/// Collect indexable files under `root`, in file-name order.
///
/// Symlinks are not followed. Files larger than `max_file_bytes` are left out.
pub fn walk_workspace(root: &Path, max_file_bytes: u64) -> Result<Vec<SourceFile>, IngestError> {
    let mut files = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(keep_entry);

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() || !is_indexable(entry.path()) {
            continue;
        }

        let size = entry.metadata()?.len();
        if size > max_file_bytes {
            debug!(path = ?entry.path(), size, "Skipping oversized file");
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        files.push(SourceFile {
            absolute: entry.into_path(),
            relative,
        });
    }

    Ok(files)
}

/// Read a file as UTF-8. `None` for files that are not valid UTF-8.
pub fn read_source(path: &Path) -> Result<Option<String>, IngestError> {
    let bytes = std::fs::read(path)?;
    match String::from_utf8(bytes) {
        Ok(text) => Ok(Some(text)),
        Err(_) => {
            debug!(path = ?path, "Skipping non UTF-8 file");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &[u8]) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_walk_filters_and_orders() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        write(root, "src/main.rs", b"fn main() {}");
        write(root, "README.md", b"# readme");
        write(root, "logo.png", b"\x89PNG");
        write(root, ".git/config", b"[core]");
        write(root, ".github/workflows/ci.yml", b"on: push");
        write(root, "node_modules/pkg/index.js", b"module.exports = 1");
        write(root, "target/debug/build.rs", b"fn x() {}");
        write(root, "app/util.py", b"x = 1");

        let files = walk_workspace(root, 1024).unwrap();
        let relative: Vec<&str> = files.iter().map(|f| f.relative.as_str()).collect();
        assert_eq!(relative, vec!["README.md", "app/util.py", "src/main.rs"]);
        assert!(files.iter().all(|f| f.absolute.starts_with(root)));
    }

    #[test]
    fn test_walk_skips_oversized_files() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "big.txt", &[b'a'; 64]);
        write(temp.path(), "small.txt", b"a");

        let files = walk_workspace(temp.path(), 16).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].relative, "small.txt");
    }

    #[test]
    fn test_hidden_root_is_still_walked() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join(".hidden-root");
        write(&root, "a.rs", b"fn a() {}");
        assert_eq!(walk_workspace(&root, 1024).unwrap().len(), 1);
    }

    #[test]
    fn test_read_source_rejects_invalid_utf8() {
        let temp = TempDir::new().unwrap();
        write(temp.path(), "ok.txt", "héllo".as_bytes());
        write(temp.path(), "bad.txt", &[0xff, 0xfe, 0x00]);

        assert_eq!(
            read_source(&temp.path().join("ok.txt")).unwrap().as_deref(),
            Some("héllo")
        );
        assert!(read_source(&temp.path().join("bad.txt")).unwrap().is_none());
    }
}
