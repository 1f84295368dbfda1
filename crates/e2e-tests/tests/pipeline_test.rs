//! Single-repository pipeline scenarios: stage ordering, per-stage retry
//! budgets, and cleanup semantics.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use e2e_tests::{pipeline, FakeIndexer, Script, TestHarness};
use refresh_pipeline::CleanupStatus;
use refresh_types::{PipelineOutcome, PipelineState, RepositoryReference, Stage};

#[tokio::test(start_paused = true)]
async fn test_ingest_recovers_within_budget() {
    let harness = TestHarness::new();
    let provider = Arc::new(harness.provider());
    let indexer = Arc::new(FakeIndexer::new().script("A", Script::FailTimes(2)));

    let report = pipeline(provider.clone(), indexer.clone(), 3, 3)
        .run(
            &RepositoryReference::new("A"),
            &harness.target(),
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(report.outcome, PipelineOutcome::Succeeded);
    assert_eq!(indexer.ingests.count("A"), 3);
    assert_eq!(report.ingest_attempts, 3);
    assert_eq!(provider.destroys.count("A"), 1);
    assert_eq!(report.cleanup, CleanupStatus::Removed);
    assert_eq!(harness.leftover_workspaces(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_ingest_exhausted_still_cleans_up_once() {
    let harness = TestHarness::new();
    let provider = Arc::new(harness.provider());
    let indexer = Arc::new(FakeIndexer::new().script("A", Script::AlwaysFail));

    let report = pipeline(provider.clone(), indexer.clone(), 3, 2)
        .run(
            &RepositoryReference::new("A"),
            &harness.target(),
            &CancellationToken::new(),
        )
        .await;

    match &report.outcome {
        PipelineOutcome::FailedAfterRetries {
            stage,
            attempts,
            last_error,
        } => {
            assert_eq!(*stage, Stage::Ingesting);
            assert_eq!(*attempts, 3);
            assert!(last_error.contains("attempt 3"));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(indexer.ingests.count("A"), 3);
    assert_eq!(provider.destroys.count("A"), 1);
    assert_eq!(
        report.states,
        vec![
            PipelineState::Pending,
            PipelineState::Fetching,
            PipelineState::Ingesting,
            PipelineState::CleaningUp,
            PipelineState::Failed,
        ]
    );
    assert_eq!(harness.leftover_workspaces(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_fetch_exhausted_skips_ingest_and_cleanup() {
    let harness = TestHarness::new();
    let provider = Arc::new(harness.provider().script("A", Script::AlwaysFail));
    let indexer = Arc::new(FakeIndexer::new());

    let report = pipeline(provider.clone(), indexer.clone(), 1, 3)
        .run(
            &RepositoryReference::new("A"),
            &harness.target(),
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(report.outcome.failed_stage(), Some(Stage::Fetching));
    assert_eq!(provider.fetches.count("A"), 2);
    assert_eq!(indexer.ingests.total(), 0);
    assert_eq!(provider.destroys.total(), 0);
    assert_eq!(report.cleanup, CleanupStatus::NotAttempted);
    assert_eq!(report.final_state(), PipelineState::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_fixed_delay_between_fetch_attempts() {
    let harness = TestHarness::new();
    let provider = Arc::new(harness.provider().script("A", Script::FailTimes(3)));
    let indexer = Arc::new(FakeIndexer::new());

    let start = Instant::now();
    let report = pipeline(provider.clone(), indexer, 3, 0)
        .run(
            &RepositoryReference::new("A"),
            &harness.target(),
            &CancellationToken::new(),
        )
        .await;

    assert!(report.outcome.is_success());
    assert_eq!(report.fetch_attempts, 4);
    assert_eq!(start.elapsed(), Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn test_cleanup_error_does_not_downgrade_success() {
    let harness = TestHarness::new();
    let provider = Arc::new(harness.provider().fail_cleanup("A"));
    let indexer = Arc::new(FakeIndexer::new());

    let report = pipeline(provider.clone(), indexer, 0, 0)
        .run(
            &RepositoryReference::new("A"),
            &harness.target(),
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(report.outcome, PipelineOutcome::Succeeded);
    assert_eq!(report.final_state(), PipelineState::Done);
    assert!(matches!(report.cleanup, CleanupStatus::Failed(_)));
    assert_eq!(provider.destroys.count("A"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_during_ingest_retry_still_cleans_up() {
    let harness = TestHarness::new();
    let provider = Arc::new(harness.provider());
    let indexer = Arc::new(FakeIndexer::new().script("A", Script::AlwaysFail));
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(15)).await;
        trigger.cancel();
    });

    let report = pipeline(provider.clone(), indexer.clone(), 0, 5)
        .run(&RepositoryReference::new("A"), &harness.target(), &cancel)
        .await;

    assert_eq!(
        report.outcome,
        PipelineOutcome::Cancelled {
            stage: Stage::Ingesting
        }
    );
    assert_eq!(indexer.ingests.count("A"), 2);
    assert_eq!(provider.destroys.count("A"), 1);
    assert_eq!(harness.leftover_workspaces(), 0);
}
