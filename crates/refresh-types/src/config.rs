//! Configuration loading for repo-refresh.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives at ~/.config/repo-refresh/config.toml.
//! Settings are read once at startup and never mutated afterwards.

use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use directories::{BaseDirs, ProjectDirs};
use serde::{Deserialize, Serialize};

use crate::error::RefreshError;
use crate::repository::{CollectionTarget, RepositoryReference};

/// Environment variable prefix (REFRESH_COLLECTION_NAME, REFRESH_RETRY__FETCH__MAX_RETRIES, ...)
pub const ENV_PREFIX: &str = "REFRESH";

/// Retry policy for one pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRetrySettings {
    /// Retries after the first attempt (total attempts = max_retries + 1)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry, in seconds
    #[serde(default = "default_delay_secs")]
    pub delay_secs: u64,

    /// Growth factor between consecutive delays (1.0 = fixed delay)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Upper bound for any single delay, in seconds
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,

    /// Per-attempt timeout in seconds (0 = no timeout)
    #[serde(default)]
    pub attempt_timeout_secs: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_delay_secs() -> u64 {
    10
}

fn default_backoff_multiplier() -> f64 {
    1.0
}

fn default_max_delay_secs() -> u64 {
    300
}

impl Default for StageRetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            delay_secs: default_delay_secs(),
            backoff_multiplier: default_backoff_multiplier(),
            max_delay_secs: default_max_delay_secs(),
            attempt_timeout_secs: 0,
        }
    }
}

/// Retry policies, configured independently per stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default)]
    pub fetch: StageRetrySettings,
    #[serde(default)]
    pub ingest: StageRetrySettings,
}

/// Clone options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitSettings {
    /// Shallow clone depth (0 = full history)
    #[serde(default = "default_git_depth")]
    pub depth: u32,

    /// Branch to check out; remote HEAD when unset
    #[serde(default)]
    pub branch: Option<String>,
}

fn default_git_depth() -> u32 {
    1
}

impl Default for GitSettings {
    fn default() -> Self {
        Self {
            depth: default_git_depth(),
            branch: None,
        }
    }
}

/// Embedding model configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingSettings {
    /// Hugging Face model id
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Model file cache; platform cache dir when unset
    #[serde(default)]
    pub cache_dir: Option<String>,

    /// Chunks per embedding call
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,
}

fn default_embedding_model() -> String {
    "sentence-transformers/all-MiniLM-L6-v2".to_string()
}

fn default_embedding_batch_size() -> usize {
    32
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            cache_dir: None,
            batch_size: default_embedding_batch_size(),
        }
    }
}

/// Vector store backend selector.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VectorBackend {
    /// usearch HNSW index with RocksDB metadata, persisted under the collection dir
    #[default]
    Usearch,
    /// Process-local, nothing written to disk
    Memory,
}

/// Vector store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorStoreSettings {
    #[serde(default)]
    pub backend: VectorBackend,

    /// Initial index reservation; grows on demand
    #[serde(default = "default_vector_capacity")]
    pub capacity: usize,
}

fn default_vector_capacity() -> usize {
    100_000
}

impl Default for VectorStoreSettings {
    fn default() -> Self {
        Self {
            backend: VectorBackend::default(),
            capacity: default_vector_capacity(),
        }
    }
}

/// Line-window chunking parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingSettings {
    #[serde(default = "default_max_lines")]
    pub max_lines: usize,

    #[serde(default = "default_overlap_lines")]
    pub overlap_lines: usize,

    /// Files larger than this are not ingested
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
}

fn default_max_lines() -> usize {
    60
}

fn default_overlap_lines() -> usize {
    10
}

fn default_max_file_bytes() -> u64 {
    1024 * 1024
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            max_lines: default_max_lines(),
            overlap_lines: default_overlap_lines(),
            max_file_bytes: default_max_file_bytes(),
        }
    }
}

/// Policy for a trigger tick that arrives while the previous cycle still runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Drop the tick and record it as skipped.
    #[default]
    Skip,

    /// Let one tick wait for the running cycle; further ticks are skipped.
    Queue,
}

/// Cron trigger configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerSettings {
    /// Job name used in logs and the job registry
    #[serde(default = "default_trigger_name")]
    pub name: String,

    /// Cron expression; 5-field expressions get a leading seconds field
    #[serde(default = "default_trigger_cron")]
    pub cron: String,

    /// IANA timezone for the schedule
    #[serde(default = "default_timezone")]
    pub timezone: String,

    #[serde(default)]
    pub overlap: OverlapPolicy,

    /// Max random start delay in seconds
    #[serde(default)]
    pub jitter_secs: u64,

    /// Fire one cycle as soon as the daemon starts
    #[serde(default)]
    pub run_on_start: bool,

    /// Grace period for an in-flight cycle at shutdown
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

fn default_trigger_name() -> String {
    "github-vector-store-scheduler".to_string()
}

fn default_trigger_cron() -> String {
    "0 0 0 * * *".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_shutdown_timeout() -> u64 {
    30
}

impl Default for TriggerSettings {
    fn default() -> Self {
        Self {
            name: default_trigger_name(),
            cron: default_trigger_cron(),
            timezone: default_timezone(),
            overlap: OverlapPolicy::default(),
            jitter_secs: 0,
            run_on_start: false,
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

/// Main application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Repositories refreshed on every cycle
    #[serde(default = "default_repositories")]
    pub repositories: Vec<String>,

    /// Root directory of the vector store
    #[serde(default = "default_persist_directory")]
    pub persist_directory: String,

    /// Collection every repository is ingested into
    #[serde(default = "default_collection_name")]
    pub collection_name: String,

    /// Parent directory for per-run workspaces
    #[serde(default = "default_workspace_root")]
    pub workspace_root: String,

    /// Upper bound on concurrently running repository pipelines
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub retry: RetrySettings,

    #[serde(default)]
    pub git: GitSettings,

    #[serde(default)]
    pub embeddings: EmbeddingSettings,

    #[serde(default)]
    pub vector_store: VectorStoreSettings,

    #[serde(default)]
    pub chunking: ChunkingSettings,

    #[serde(default)]
    pub trigger: TriggerSettings,
}

fn default_repositories() -> Vec<String> {
    vec![
        "https://github.com/Bessouat40/RAGLight".to_string(),
        "https://github.com/Bessouat40/LLMChat".to_string(),
    ]
}

fn default_persist_directory() -> String {
    "./chroma_db".to_string()
}

fn default_collection_name() -> String {
    "github_repos".to_string()
}

fn default_workspace_root() -> String {
    std::env::temp_dir()
        .join("repo-refresh")
        .join("workspaces")
        .to_string_lossy()
        .to_string()
}

fn default_max_concurrency() -> usize {
    4
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            repositories: default_repositories(),
            persist_directory: default_persist_directory(),
            collection_name: default_collection_name(),
            workspace_root: default_workspace_root(),
            max_concurrency: default_max_concurrency(),
            log_level: default_log_level(),
            retry: RetrySettings::default(),
            git: GitSettings::default(),
            embeddings: EmbeddingSettings::default(),
            vector_store: VectorStoreSettings::default(),
            chunking: ChunkingSettings::default(),
            trigger: TriggerSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/repo-refresh/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (REFRESH_*)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, RefreshError> {
        let config_dir = ProjectDirs::from("", "", "repo-refresh")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");
        Self::load_layered(Some(&default_config_path), cli_config_path, ENV_PREFIX)
    }

    pub(crate) fn load_layered(
        default_config_path: Option<&Path>,
        cli_config_path: Option<&str>,
        env_prefix: &str,
    ) -> Result<Self, RefreshError> {
        let mut builder = Config::builder()
            .set_default("repositories", default_repositories())?
            .set_default("persist_directory", default_persist_directory())?
            .set_default("collection_name", default_collection_name())?
            .set_default("workspace_root", default_workspace_root())?
            .set_default("max_concurrency", default_max_concurrency() as i64)?
            .set_default("log_level", default_log_level())?;

        if let Some(path) = default_config_path {
            builder = builder.add_source(File::with_name(&path.to_string_lossy()).required(false));
        }

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // REFRESH_MAX_CONCURRENCY, REFRESH_TRIGGER__CRON, REFRESH_REPOSITORIES=a,b
        builder = builder.add_source(
            Environment::with_prefix(env_prefix)
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("repositories")
                .try_parsing(true),
        );

        let settings: Settings = builder.build()?.try_deserialize()?;
        Ok(settings)
    }

    /// Check invariants the type system cannot express.
    ///
    /// Cron and timezone syntax are checked by the scheduler when the job is
    /// registered.
    pub fn validate(&self) -> Result<(), RefreshError> {
        if self.collection_name.trim().is_empty() {
            return Err(RefreshError::Config(
                "collection_name must not be empty".to_string(),
            ));
        }
        if self.max_concurrency == 0 {
            return Err(RefreshError::Config(
                "max_concurrency must be > 0".to_string(),
            ));
        }
        if self.chunking.max_lines == 0 || self.chunking.overlap_lines >= self.chunking.max_lines {
            return Err(RefreshError::Config(format!(
                "chunking.overlap_lines ({}) must be smaller than chunking.max_lines ({})",
                self.chunking.overlap_lines, self.chunking.max_lines
            )));
        }
        if self.embeddings.batch_size == 0 {
            return Err(RefreshError::Config(
                "embeddings.batch_size must be > 0".to_string(),
            ));
        }
        for (stage, retry) in [("fetch", &self.retry.fetch), ("ingest", &self.retry.ingest)] {
            if retry.backoff_multiplier < 1.0 || !retry.backoff_multiplier.is_finite() {
                return Err(RefreshError::Config(format!(
                    "retry.{stage}.backoff_multiplier must be >= 1.0, got {}",
                    retry.backoff_multiplier
                )));
            }
        }
        Ok(())
    }

    /// The fixed reference list, in configured order.
    pub fn references(&self) -> Vec<RepositoryReference> {
        self.repositories
            .iter()
            .map(|r| RepositoryReference::new(r.trim()))
            .collect()
    }

    /// The collection every repository of a cycle is written into.
    pub fn collection_target(&self) -> CollectionTarget {
        CollectionTarget::new(
            expand_path(&self.persist_directory),
            self.collection_name.clone(),
        )
    }

    pub fn expanded_workspace_root(&self) -> PathBuf {
        expand_path(&self.workspace_root)
    }

    pub fn expanded_model_cache_dir(&self) -> Option<PathBuf> {
        self.embeddings.cache_dir.as_deref().map(expand_path)
    }
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_path(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(dirs) = BaseDirs::new() {
            return dirs.home_dir().join(rest);
        }
    }
    PathBuf::from(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.collection_name, "github_repos");
        assert_eq!(settings.persist_directory, "./chroma_db");
        assert_eq!(settings.repositories.len(), 2);
        assert_eq!(settings.max_concurrency, 4);
        assert_eq!(settings.retry.fetch.max_retries, 3);
        assert_eq!(settings.retry.ingest.delay_secs, 10);
        assert_eq!(settings.trigger.cron, "0 0 0 * * *");
        assert_eq!(settings.trigger.overlap, OverlapPolicy::Skip);
        assert_eq!(settings.vector_store.backend, VectorBackend::Usearch);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_load_with_defaults() {
        let settings =
            Settings::load_layered(None, None, "REFRESHTEST_DEFAULTS_UNSET").unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
repositories = ["https://example.com/one.git"]
collection_name = "code"
max_concurrency = 8

[retry.fetch]
max_retries = 5
delay_secs = 2

[trigger]
cron = "0 */5 * * * *"
overlap = "queue"

[vector_store]
backend = "memory"
"#
        )
        .unwrap();

        let path = file.path().to_string_lossy().to_string();
        let settings =
            Settings::load_layered(None, Some(&path), "REFRESHTEST_FILE_UNSET").unwrap();

        assert_eq!(settings.repositories, vec!["https://example.com/one.git"]);
        assert_eq!(settings.collection_name, "code");
        assert_eq!(settings.max_concurrency, 8);
        assert_eq!(settings.retry.fetch.max_retries, 5);
        assert_eq!(settings.retry.fetch.delay_secs, 2);
        // untouched stage keeps its defaults
        assert_eq!(settings.retry.ingest, StageRetrySettings::default());
        assert_eq!(settings.trigger.overlap, OverlapPolicy::Queue);
        assert_eq!(settings.trigger.timezone, "UTC");
        assert_eq!(settings.vector_store.backend, VectorBackend::Memory);
    }

    #[test]
    fn test_missing_cli_config_file_is_an_error() {
        let result = Settings::load_layered(
            None,
            Some("/nonexistent/repo-refresh/config.toml"),
            "REFRESHTEST_MISSING_UNSET",
        );
        assert!(matches!(result, Err(RefreshError::Config(_))));
    }

    #[test]
    fn test_env_overrides() {
        std::env::set_var("REFRESHTEST_ENV_COLLECTION_NAME", "from_env");
        std::env::set_var("REFRESHTEST_ENV_REPOSITORIES", "https://a.example/x,https://b.example/y");
        std::env::set_var("REFRESHTEST_ENV_RETRY__INGEST__MAX_RETRIES", "7");

        let settings = Settings::load_layered(None, None, "REFRESHTEST_ENV").unwrap();

        assert_eq!(settings.collection_name, "from_env");
        assert_eq!(
            settings.repositories,
            vec!["https://a.example/x", "https://b.example/y"]
        );
        assert_eq!(settings.retry.ingest.max_retries, 7);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut settings = Settings::default();
        settings.max_concurrency = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.collection_name = "  ".to_string();
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.chunking.overlap_lines = settings.chunking.max_lines;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.retry.ingest.backoff_multiplier = 0.5;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_references_keep_order_and_duplicates() {
        let settings = Settings {
            repositories: vec!["a".into(), " b ".into(), "a".into()],
            ..Default::default()
        };
        let refs: Vec<String> = settings
            .references()
            .into_iter()
            .map(|r| r.to_string())
            .collect();
        assert_eq!(refs, vec!["a", "b", "a"]);
    }

    #[test]
    fn test_collection_target() {
        let settings = Settings {
            persist_directory: "/srv/store".into(),
            collection_name: "repos".into(),
            ..Default::default()
        };
        let target = settings.collection_target();
        assert_eq!(target.persist_directory, PathBuf::from("/srv/store"));
        assert_eq!(target.collection_name, "repos");
    }

    #[test]
    fn test_expand_path_leaves_plain_paths() {
        assert_eq!(expand_path("/abs/path"), PathBuf::from("/abs/path"));
        assert_eq!(expand_path("rel/path"), PathBuf::from("rel/path"));
    }
}
