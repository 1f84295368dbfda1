//! Attempts that time out or are cancelled part way through, run against a
//! real git clone and the code indexer. Nothing the abandoned attempt started
//! may outlive the pipeline run.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use e2e_tests::{init_git_repo, MockEmbedder, TestHarness};
use refresh_indexing::{CodeIndexer, IndexerConfig};
use refresh_pipeline::{CleanupStatus, RepositoryPipeline, RetryPolicy};
use refresh_types::{PipelineOutcome, RepositoryReference, Stage};
use refresh_vector::VectorStore;
use refresh_workspace::{GitWorkspaceConfig, GitWorkspaceProvider};

const DIMENSION: usize = 8;

struct Setup {
    harness: TestHarness,
    _source: TempDir,
    reference: RepositoryReference,
    embedder: Arc<MockEmbedder>,
    store: Arc<VectorStore>,
    provider: Arc<GitWorkspaceProvider>,
    indexer: Arc<CodeIndexer>,
}

fn setup(files: usize, embed_delay: Duration) -> Setup {
    let harness = TestHarness::new();
    let source = TempDir::new().unwrap();
    let contents: Vec<(String, String)> = (0..files)
        .map(|i| (format!("src/f{i}.rs"), format!("pub fn f{i}() -> u32 {{\n    {i}\n}}\n")))
        .collect();
    let borrowed: Vec<(&str, &str)> = contents
        .iter()
        .map(|(p, c)| (p.as_str(), c.as_str()))
        .collect();
    init_git_repo(source.path(), &borrowed);
    let reference = RepositoryReference::new(source.path().to_string_lossy());

    let embedder = Arc::new(MockEmbedder::new(DIMENSION).with_delay(embed_delay));
    let store = Arc::new(VectorStore::in_memory());
    let provider = Arc::new(GitWorkspaceProvider::new(
        GitWorkspaceConfig::new(&harness.workspace_root).with_depth(0),
    ));
    let indexer = Arc::new(CodeIndexer::new(
        embedder.clone(),
        store.clone(),
        IndexerConfig {
            batch_size: 1,
            ..Default::default()
        },
    ));

    Setup {
        harness,
        _source: source,
        reference,
        embedder,
        store,
        provider,
        indexer,
    }
}

fn quick(max_retries: u32) -> RetryPolicy {
    RetryPolicy::fixed(max_retries, Duration::from_millis(10))
}

async fn wait_for_empty_root(harness: &TestHarness) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while harness.leftover_workspaces() > 0 {
        assert!(Instant::now() < deadline, "workspace left behind");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_fetch_attempt_timeout_leaves_no_clone() {
    let s = setup(300, Duration::ZERO);
    let pipeline = RepositoryPipeline::new(s.provider.clone(), s.indexer.clone())
        .with_fetch_policy(quick(2).with_attempt_timeout(Duration::from_millis(1)))
        .with_ingest_policy(quick(0));

    let report = pipeline
        .run(&s.reference, &s.harness.target(), &CancellationToken::new())
        .await;

    if let PipelineOutcome::FailedAfterRetries { stage, attempts, .. } = &report.outcome {
        assert_eq!(*stage, Stage::Fetching);
        assert_eq!(*attempts, 3);
    }
    wait_for_empty_root(&s.harness).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_ingest_attempt_timeout_stops_collection_writes() {
    let s = setup(20, Duration::from_millis(100));
    let pipeline = RepositoryPipeline::new(s.provider.clone(), s.indexer.clone())
        .with_fetch_policy(quick(0))
        .with_ingest_policy(quick(0).with_attempt_timeout(Duration::from_millis(250)));

    let report = pipeline
        .run(&s.reference, &s.harness.target(), &CancellationToken::new())
        .await;

    match &report.outcome {
        PipelineOutcome::FailedAfterRetries {
            stage, attempts, ..
        } => {
            assert_eq!(*stage, Stage::Ingesting);
            assert_eq!(*attempts, 1);
        }
        other => panic!("expected ingest failure, got {other:?}"),
    }
    assert_eq!(report.cleanup, CleanupStatus::Removed);
    assert_eq!(s.harness.leftover_workspaces(), 0);

    let collection = s.store.collection(&s.harness.target(), DIMENSION).unwrap();
    let written = collection.len();
    assert!(written < 20);
    let embedded = s.embedder.calls.load(Ordering::SeqCst);

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(collection.len(), written);
    // at most the batch that was embedding when the attempt was dropped
    assert!(s.embedder.calls.load(Ordering::SeqCst) <= embedded + 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_mid_ingest_stops_collection_writes() {
    let s = setup(20, Duration::from_millis(100));
    let pipeline = RepositoryPipeline::new(s.provider.clone(), s.indexer.clone())
        .with_fetch_policy(quick(0))
        .with_ingest_policy(quick(3));
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    let embedder = s.embedder.clone();
    tokio::spawn(async move {
        while embedder.calls.load(Ordering::SeqCst) < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        trigger.cancel();
    });

    let report = pipeline
        .run(&s.reference, &s.harness.target(), &cancel)
        .await;

    assert_eq!(
        report.outcome,
        PipelineOutcome::Cancelled {
            stage: Stage::Ingesting
        }
    );
    assert_eq!(report.cleanup, CleanupStatus::Removed);
    assert_eq!(s.harness.leftover_workspaces(), 0);

    let collection = s.store.collection(&s.harness.target(), DIMENSION).unwrap();
    let written = collection.len();
    assert!(written < 20);

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(collection.len(), written);
}
