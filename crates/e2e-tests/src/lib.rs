//! End-to-end test infrastructure for repo-refresh.
//!
//! Scripted fakes for the two pipeline collaborators, a deterministic
//! embedder, and a harness that owns the temporary directories a test needs.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ulid::Ulid;

use refresh_embeddings::{Embedding, EmbeddingError, EmbeddingModel, ModelInfo};
use refresh_indexing::{Indexer, IngestError, IngestReport};
use refresh_pipeline::{FanOutScheduler, RepositoryPipeline, RetryPolicy};
use refresh_types::{CollectionTarget, RepositoryReference, Workspace};
use refresh_workspace::{CleanupError, FetchError, WorkspaceProvider};

/// How a fake responds to successive calls for one reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    Succeed,
    /// Fail the first n calls, then succeed
    FailTimes(u32),
    AlwaysFail,
}

impl Script {
    fn fails(self, call: u32) -> bool {
        match self {
            Script::Succeed => false,
            Script::FailTimes(n) => call <= n,
            Script::AlwaysFail => true,
        }
    }
}

/// Per-reference call counter.
#[derive(Default)]
pub struct CallLog {
    calls: Mutex<HashMap<String, u32>>,
}

impl CallLog {
    /// Record a call and return its 1-based number for this reference.
    fn record(&self, reference: &str) -> u32 {
        let mut calls = self.calls.lock().unwrap();
        let count = calls.entry(reference.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    pub fn count(&self, reference: &str) -> u32 {
        self.calls.lock().unwrap().get(reference).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u32 {
        self.calls.lock().unwrap().values().sum()
    }
}

/// Tracks concurrent calls and the highest concurrency seen.
#[derive(Default)]
pub struct Concurrency {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl Concurrency {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Workspace provider that never touches the network.
///
/// Workspaces are real directories under `root` so path disjointness and
/// cleanup can be observed on disk.
pub struct FakeWorkspaceProvider {
    root: PathBuf,
    scripts: Mutex<HashMap<String, Script>>,
    failing_cleanup: Mutex<HashSet<String>>,
    delay: Duration,
    pub fetches: CallLog,
    pub destroys: CallLog,
    pub concurrency: Concurrency,
    active: Mutex<HashSet<PathBuf>>,
    shared_path_seen: AtomicBool,
}

impl FakeWorkspaceProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            scripts: Mutex::new(HashMap::new()),
            failing_cleanup: Mutex::new(HashSet::new()),
            delay: Duration::ZERO,
            fetches: CallLog::default(),
            destroys: CallLog::default(),
            concurrency: Concurrency::default(),
            active: Mutex::new(HashSet::new()),
            shared_path_seen: AtomicBool::new(false),
        }
    }

    /// Simulated clone time.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn script(self, reference: &str, script: Script) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(reference.to_string(), script);
        self
    }

    pub fn fail_cleanup(self, reference: &str) -> Self {
        self.failing_cleanup
            .lock()
            .unwrap()
            .insert(reference.to_string());
        self
    }

    /// True if two live workspaces ever had the same path.
    pub fn shared_path_seen(&self) -> bool {
        self.shared_path_seen.load(Ordering::SeqCst)
    }

    /// Workspaces fetched but not destroyed.
    pub fn live_workspaces(&self) -> usize {
        self.active.lock().unwrap().len()
    }
}

#[async_trait]
impl WorkspaceProvider for FakeWorkspaceProvider {
    async fn fetch(&self, reference: &RepositoryReference) -> Result<Workspace, FetchError> {
        let call = self.fetches.record(reference.as_str());
        self.concurrency.enter();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.concurrency.exit();

        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(reference.as_str())
            .copied()
            .unwrap_or(Script::Succeed);
        if script.fails(call) {
            return Err(FetchError::Clone {
                reference: reference.to_string(),
                reason: format!("scripted failure on attempt {call}"),
            });
        }

        let path = self.root.join(format!("{}-{}", reference.slug(), Ulid::new()));
        std::fs::create_dir_all(&path)?;
        if !self.active.lock().unwrap().insert(path.clone()) {
            self.shared_path_seen.store(true, Ordering::SeqCst);
        }
        Ok(Workspace::new(reference.clone(), path))
    }

    async fn destroy(&self, workspace: &Workspace) -> Result<(), CleanupError> {
        self.destroys.record(workspace.reference().as_str());
        self.active.lock().unwrap().remove(workspace.path());

        if self
            .failing_cleanup
            .lock()
            .unwrap()
            .contains(workspace.reference().as_str())
        {
            return Err(CleanupError::Missing(workspace.path().to_path_buf()));
        }
        std::fs::remove_dir_all(workspace.path()).map_err(|source| CleanupError::Io {
            path: workspace.path().to_path_buf(),
            source,
        })
    }
}

/// Indexer that records calls and follows per-reference scripts.
#[derive(Default)]
pub struct FakeIndexer {
    scripts: Mutex<HashMap<String, Script>>,
    delay: Duration,
    pub ingests: CallLog,
    pub concurrency: Concurrency,
}

impl FakeIndexer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn script(self, reference: &str, script: Script) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(reference.to_string(), script);
        self
    }
}

#[async_trait]
impl Indexer for FakeIndexer {
    async fn ingest(
        &self,
        workspace: &Workspace,
        _target: &CollectionTarget,
    ) -> Result<IngestReport, IngestError> {
        let reference = workspace.reference().as_str();
        let call = self.ingests.record(reference);
        self.concurrency.enter();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.concurrency.exit();

        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(reference)
            .copied()
            .unwrap_or(Script::Succeed);
        if script.fails(call) {
            return Err(IngestError::Task(format!(
                "scripted failure on attempt {call}"
            )));
        }
        Ok(IngestReport {
            files_scanned: 1,
            files_indexed: 1,
            chunks_upserted: 1,
            ..Default::default()
        })
    }
}

/// Deterministic embedder: blake3 of the text spread over `dimension` floats.
pub struct MockEmbedder {
    info: ModelInfo,
    pub calls: AtomicUsize,
    delay: Duration,
}

impl MockEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            info: ModelInfo {
                name: "mock".to_string(),
                dimension,
                max_sequence_length: 256,
            },
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    /// Blocks the calling thread this long per text.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl EmbeddingModel for MockEmbedder {
    fn info(&self) -> &ModelInfo {
        &self.info
    }

    fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        let mut hasher = blake3::Hasher::new();
        hasher.update(text.as_bytes());
        let mut bytes = vec![0u8; self.info.dimension];
        hasher.finalize_xof().fill(&mut bytes);
        Ok(Embedding::new(
            bytes.into_iter().map(|b| f32::from(b) + 1.0).collect(),
        ))
    }
}

/// Temporary directories for one test.
pub struct TestHarness {
    /// Keeps temp dir alive for the lifetime of the harness
    pub _temp_dir: tempfile::TempDir,
    pub workspace_root: PathBuf,
    pub persist_dir: PathBuf,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let workspace_root = temp_dir.path().join("workspaces");
        let persist_dir = temp_dir.path().join("db");
        std::fs::create_dir_all(&workspace_root).expect("Failed to create workspace root");

        Self {
            _temp_dir: temp_dir,
            workspace_root,
            persist_dir,
        }
    }

    pub fn target(&self) -> CollectionTarget {
        CollectionTarget::new(&self.persist_dir, "github_repos")
    }

    pub fn provider(&self) -> FakeWorkspaceProvider {
        FakeWorkspaceProvider::new(&self.workspace_root)
    }

    /// Directories currently left under the workspace root.
    pub fn leftover_workspaces(&self) -> usize {
        std::fs::read_dir(&self.workspace_root)
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// A pipeline with fixed 10s delays and the given per-stage retry budgets.
pub fn pipeline(
    provider: Arc<dyn WorkspaceProvider>,
    indexer: Arc<dyn Indexer>,
    fetch_retries: u32,
    ingest_retries: u32,
) -> RepositoryPipeline {
    RepositoryPipeline::new(provider, indexer)
        .with_fetch_policy(RetryPolicy::fixed(fetch_retries, Duration::from_secs(10)))
        .with_ingest_policy(RetryPolicy::fixed(ingest_retries, Duration::from_secs(10)))
}

pub fn fanout(pipeline: RepositoryPipeline, max_concurrency: usize) -> Arc<FanOutScheduler> {
    Arc::new(FanOutScheduler::new(Arc::new(pipeline), max_concurrency))
}

pub fn refs(names: &[&str]) -> Vec<RepositoryReference> {
    names.iter().map(|n| RepositoryReference::new(*n)).collect()
}

/// Create a git repository at `dir` with one commit containing `files`.
pub fn init_git_repo(dir: &Path, files: &[(&str, &str)]) {
    let repo = git2::Repository::init(dir).expect("Failed to init repo");
    let mut index = repo.index().expect("Failed to open index");
    for (rel, content) in files {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create dir");
        }
        std::fs::write(&path, content).expect("Failed to write file");
        index.add_path(Path::new(rel)).expect("Failed to stage file");
    }
    index.write().expect("Failed to write index");
    let tree_id = index.write_tree().expect("Failed to write tree");
    let tree = repo.find_tree(tree_id).expect("Failed to find tree");
    let sig = git2::Signature::now("Test", "test@example.com").expect("Failed to build signature");
    repo.commit(Some("HEAD"), &sig, &sig, "initial", &tree, &[])
        .expect("Failed to commit");
}
