//! Real git clone and code indexing against the in-memory vector store.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use pretty_assertions::assert_eq;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use e2e_tests::{fanout, init_git_repo, pipeline, MockEmbedder, TestHarness};
use refresh_indexing::{CodeIndexer, IndexerConfig};
use refresh_pipeline::CleanupStatus;
use refresh_types::{PipelineOutcome, RepositoryReference};
use refresh_vector::VectorStore;
use refresh_workspace::{GitWorkspaceConfig, GitWorkspaceProvider};

const DIMENSION: usize = 16;

struct Setup {
    harness: TestHarness,
    _source: TempDir,
    reference: RepositoryReference,
    embedder: Arc<MockEmbedder>,
    store: Arc<VectorStore>,
    provider: Arc<GitWorkspaceProvider>,
    indexer: Arc<CodeIndexer>,
}

fn setup() -> Setup {
    let harness = TestHarness::new();
    let source = TempDir::new().unwrap();
    init_git_repo(
        source.path(),
        &[
            ("README.md", "# demo\n\nA tiny repository.\n"),
            ("src/main.py", "def main():\n    print('hi')\n\nmain()\n"),
            ("src/lib.rs", "pub fn add(a: u32, b: u32) -> u32 {\n    a + b\n}\n"),
            ("assets/logo.png", "not really a png"),
        ],
    );
    let reference = RepositoryReference::new(source.path().to_string_lossy());

    let embedder = Arc::new(MockEmbedder::new(DIMENSION));
    let store = Arc::new(VectorStore::in_memory());
    let provider = Arc::new(GitWorkspaceProvider::new(
        GitWorkspaceConfig::new(&harness.workspace_root).with_depth(0),
    ));
    let indexer = Arc::new(CodeIndexer::new(
        embedder.clone(),
        store.clone(),
        IndexerConfig::default(),
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

#[tokio::test]
async fn test_clone_index_and_cleanup() {
    let s = setup();
    let cycle = fanout(pipeline(s.provider.clone(), s.indexer.clone(), 0, 0), 2)
        .run_all(
            std::slice::from_ref(&s.reference),
            &s.harness.target(),
            &CancellationToken::new(),
        )
        .await;

    let report = &cycle.reports[0];
    assert_eq!(report.outcome, PipelineOutcome::Succeeded);
    assert_eq!(report.cleanup, CleanupStatus::Removed);

    let ingest = report.ingest.as_ref().unwrap();
    assert_eq!(ingest.files_indexed, 3);
    assert_eq!(ingest.chunks_upserted, 3);

    let collection = s.store.collection(&s.harness.target(), DIMENSION).unwrap();
    assert_eq!(collection.len(), 3);
    assert_eq!(s.harness.leftover_workspaces(), 0);
}

#[tokio::test]
async fn test_second_cycle_over_unchanged_repository_is_a_no_op() {
    let s = setup();
    let scheduler = fanout(pipeline(s.provider.clone(), s.indexer.clone(), 0, 0), 1);
    let input = vec![s.reference.clone()];

    scheduler
        .run_all(&input, &s.harness.target(), &CancellationToken::new())
        .await;
    let embedded = s.embedder.calls.load(Ordering::SeqCst);

    let second = scheduler
        .run_all(&input, &s.harness.target(), &CancellationToken::new())
        .await;

    let ingest = second.reports[0].ingest.as_ref().unwrap();
    assert!(second.is_clean());
    assert_eq!(ingest.chunks_upserted, 0);
    assert_eq!(ingest.chunks_unchanged, 3);
    assert_eq!(s.embedder.calls.load(Ordering::SeqCst), embedded);
}

#[tokio::test]
async fn test_concurrent_ingests_share_one_collection() {
    let s = setup();
    let other = TempDir::new().unwrap();
    init_git_repo(other.path(), &[("app.go", "package main\n\nfunc main() {}\n")]);
    let input = vec![
        s.reference.clone(),
        RepositoryReference::new(other.path().to_string_lossy()),
    ];

    let cycle = fanout(pipeline(s.provider.clone(), s.indexer.clone(), 0, 0), 2)
        .run_all(&input, &s.harness.target(), &CancellationToken::new())
        .await;

    assert!(cycle.is_clean());
    let collection = s.store.collection(&s.harness.target(), DIMENSION).unwrap();
    assert_eq!(collection.len(), 4);
    assert_eq!(s.store.open_collections(), 1);
}

#[tokio::test]
async fn test_missing_repository_fails_fetch_without_leftovers() {
    let s = setup();
    let missing = RepositoryReference::new(
        s.harness.workspace_root.join("does-not-exist").to_string_lossy(),
    );

    let cycle = fanout(pipeline(s.provider.clone(), s.indexer.clone(), 0, 0), 1)
        .run_all(&[missing], &s.harness.target(), &CancellationToken::new())
        .await;

    assert!(matches!(
        cycle.reports[0].outcome,
        PipelineOutcome::FailedAfterRetries { .. }
    ));
    assert_eq!(s.harness.leftover_workspaces(), 0);
}
