//! Which files and directories are worth ingesting.

use std::path::Path;

/// Extensions of source and documentation files that get indexed.
pub const INDEXABLE_EXTENSIONS: &[&str] = &[
    "rs", "py", "pyi", "js", "jsx", "mjs", "cjs", "ts", "tsx", "go", "java", "kt", "kts", "scala",
    "c", "h", "cc", "cpp", "hpp", "cs", "rb", "php", "swift", "lua", "r", "jl", "sh", "bash",
    "zsh", "sql", "html", "css", "scss", "vue", "svelte", "md", "mdx", "rst", "txt", "toml",
    "yaml", "yml", "json", "ini", "cfg",
];

/// Extension-less files that are still source.
const INDEXABLE_FILE_NAMES: &[&str] = &["Dockerfile", "Makefile", "Justfile", "Procfile"];

/// Build output, dependency and cache directories.
pub const SKIPPED_DIRS: &[&str] = &[
    "target",
    "node_modules",
    "dist",
    "build",
    "vendor",
    "__pycache__",
    "venv",
];

/// True if the file at `path` should be indexed, judged by name alone.
pub fn is_indexable(path: &Path) -> bool {
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        let ext = ext.to_ascii_lowercase();
        return INDEXABLE_EXTENSIONS.contains(&ext.as_str());
    }
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| INDEXABLE_FILE_NAMES.contains(&n))
}

/// True for hidden directories and well-known build/vendor directories.
pub fn is_skipped_dir(name: &str) -> bool {
    name.starts_with('.') || SKIPPED_DIRS.contains(&name)
}
