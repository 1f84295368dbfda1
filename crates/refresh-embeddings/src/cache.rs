//! On-disk cache of embedding model files fetched from the Hugging Face Hub.

use std::path::PathBuf;

use tracing::{debug, info};

use crate::error::EmbeddingError;

pub const DEFAULT_MODEL_REPO: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// Files a BERT sentence-transformers checkpoint needs.
pub const MODEL_FILES: &[&str] = &["config.json", "tokenizer.json", "model.safetensors"];

/// Where one model's files live: `<cache_dir>/<repo_id with '/' → '_'>`.
#[derive(Debug, Clone)]
pub struct ModelCache {
    pub cache_dir: PathBuf,
    pub repo_id: String,
}

fn platform_cache_dir() -> PathBuf {
    let base = dirs::cache_dir().unwrap_or_else(|| PathBuf::from(".cache"));
    base.join("repo-refresh").join("models")
}

impl Default for ModelCache {
    fn default() -> Self {
        Self::for_model(DEFAULT_MODEL_REPO, None)
    }
}

impl ModelCache {
    pub fn new(cache_dir: impl Into<PathBuf>, repo_id: impl Into<String>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            repo_id: repo_id.into(),
        }
    }

    /// `None` falls back to the platform cache directory.
    pub fn for_model(repo_id: impl Into<String>, cache_dir: Option<PathBuf>) -> Self {
        Self::new(cache_dir.unwrap_or_else(platform_cache_dir), repo_id)
    }

    pub fn model_dir(&self) -> PathBuf {
        self.cache_dir.join(self.repo_id.replace('/', "_"))
    }

    pub fn file_path(&self, filename: &str) -> PathBuf {
        self.model_dir().join(filename)
    }

    fn missing_files(&self) -> Vec<&'static str> {
        MODEL_FILES
            .iter()
            .copied()
            .filter(|f| !self.file_path(f).exists())
            .collect()
    }

    pub fn is_cached(&self) -> bool {
        self.missing_files().is_empty()
    }

    fn paths(&self) -> ModelPaths {
        ModelPaths {
            config: self.file_path("config.json"),
            tokenizer: self.file_path("tokenizer.json"),
            weights: self.file_path("model.safetensors"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModelPaths {
    pub config: PathBuf,
    pub tokenizer: PathBuf,
    pub weights: PathBuf,
}

/// Resolve the model files, fetching only the ones not already on disk.
pub fn get_or_download_model(cache: &ModelCache) -> Result<ModelPaths, EmbeddingError> {
    let missing = cache.missing_files();
    if missing.is_empty() {
        debug!(dir = %cache.model_dir().display(), "Model files cached");
        return Ok(cache.paths());
    }

    info!(repo = %cache.repo_id, files = missing.len(), "Fetching model from Hugging Face Hub");
    let api = hf_hub::api::sync::Api::new().map_err(|e| EmbeddingError::Download(e.to_string()))?;
    let repo = api.model(cache.repo_id.clone());
    std::fs::create_dir_all(cache.model_dir())?;

    for name in missing {
        let fetched = repo
            .get(name)
            .map_err(|e| EmbeddingError::Download(format!("{} {}: {}", cache.repo_id, name, e)))?;
        let dest = cache.file_path(name);
        std::fs::copy(&fetched, &dest)?;
        debug!(file = name, dest = %dest.display(), "Model file stored");
    }

    Ok(cache.paths())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch_all(cache: &ModelCache) {
        std::fs::create_dir_all(cache.model_dir()).unwrap();
        for f in MODEL_FILES {
            std::fs::write(cache.file_path(f), "{}").unwrap();
        }
    }

    #[test]
    fn test_default_uses_minilm_under_platform_dir() {
        let cache = ModelCache::default();
        assert_eq!(cache.repo_id, DEFAULT_MODEL_REPO);
        assert!(cache.cache_dir.ends_with("repo-refresh/models"));
    }

    #[test]
    fn test_model_dir_flattens_repo_id() {
        let cache = ModelCache::new("/cache", "org/model-name");
        assert_eq!(cache.model_dir(), PathBuf::from("/cache/org_model-name"));
    }

    #[test]
    fn test_for_model_honors_explicit_dir() {
        let cache = ModelCache::for_model("org/m", Some(PathBuf::from("/x")));
        assert_eq!(cache.cache_dir, PathBuf::from("/x"));
    }

    #[test]
    fn test_partial_download_is_not_cached() {
        let temp = TempDir::new().unwrap();
        let cache = ModelCache::new(temp.path(), "test/model");
        assert_eq!(cache.missing_files().len(), 3);

        std::fs::create_dir_all(cache.model_dir()).unwrap();
        std::fs::write(cache.file_path("config.json"), "{}").unwrap();
        assert!(!cache.is_cached());
        assert_eq!(
            cache.missing_files(),
            vec!["tokenizer.json", "model.safetensors"]
        );
    }

    #[test]
    fn test_cached_model_resolves_without_network() {
        let temp = TempDir::new().unwrap();
        let cache = ModelCache::new(temp.path(), "test/model");
        touch_all(&cache);

        let paths = get_or_download_model(&cache).unwrap();
        assert_eq!(paths.weights, cache.model_dir().join("model.safetensors"));
        assert!(paths.config.exists());
        assert!(paths.tokenizer.exists());
    }
}
