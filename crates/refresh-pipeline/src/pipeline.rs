//! The per-repository state machine.
//!
//! `Pending → Fetching → Ingesting → CleaningUp → Done`, or `Failed`.
//! A fetch failure ends the run without ingest or cleanup. Any run that
//! obtained a workspace attempts cleanup exactly once, whatever ingest did.

use std::sync::Arc;
use std::time::Instant;

use refresh_indexing::{Indexer, IngestReport};
use refresh_types::{
    CollectionTarget, PipelineOutcome, PipelineState, RepositoryReference, RetrySettings, Stage,
};
use refresh_workspace::WorkspaceProvider;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::retry::{run_with_retry, RetryOutcome, RetryPolicy};

/// What happened to the workspace at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum CleanupStatus {
    /// No workspace was created
    NotAttempted,
    Removed,
    /// Removal failed; the directory may be orphaned
    Failed(String),
}

/// Everything one pipeline run produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub reference: RepositoryReference,
    pub outcome: PipelineOutcome,
    /// States visited, in order
    pub states: Vec<PipelineState>,
    pub fetch_attempts: u32,
    pub ingest_attempts: u32,
    pub cleanup: CleanupStatus,
    pub ingest: Option<IngestReport>,
    pub duration_ms: u64,
}

impl PipelineReport {
    fn new(reference: RepositoryReference) -> Self {
        Self {
            reference,
            outcome: PipelineOutcome::Succeeded,
            states: vec![PipelineState::Pending],
            fetch_attempts: 0,
            ingest_attempts: 0,
            cleanup: CleanupStatus::NotAttempted,
            ingest: None,
            duration_ms: 0,
        }
    }

    /// Report for a run whose task died before producing one.
    pub fn aborted(reference: RepositoryReference, reason: impl Into<String>) -> Self {
        let mut report = Self::new(reference);
        report.outcome = PipelineOutcome::Aborted {
            reason: reason.into(),
        };
        report.states.push(PipelineState::Failed);
        report
    }

    /// Final state reached.
    pub fn final_state(&self) -> PipelineState {
        self.states
            .last()
            .copied()
            .unwrap_or(PipelineState::Pending)
    }

    fn enter(&mut self, state: PipelineState) {
        self.states.push(state);
    }

    fn finish(mut self, outcome: PipelineOutcome, started: Instant) -> Self {
        self.enter(if outcome.is_success() {
            PipelineState::Done
        } else {
            PipelineState::Failed
        });
        self.outcome = outcome;
        self.duration_ms = started.elapsed().as_millis().try_into().unwrap_or(u64::MAX);
        self
    }
}

/// Runs fetch → ingest → cleanup for one reference at a time.
///
/// Holds no per-run state, so one instance serves every concurrent run.
pub struct RepositoryPipeline {
    provider: Arc<dyn WorkspaceProvider>,
    indexer: Arc<dyn Indexer>,
    fetch_policy: RetryPolicy,
    ingest_policy: RetryPolicy,
}

impl RepositoryPipeline {
    pub fn new(provider: Arc<dyn WorkspaceProvider>, indexer: Arc<dyn Indexer>) -> Self {
        Self {
            provider,
            indexer,
            fetch_policy: RetryPolicy::default(),
            ingest_policy: RetryPolicy::default(),
        }
    }

    pub fn with_fetch_policy(mut self, policy: RetryPolicy) -> Self {
        self.fetch_policy = policy;
        self
    }

    pub fn with_ingest_policy(mut self, policy: RetryPolicy) -> Self {
        self.ingest_policy = policy;
        self
    }

    pub fn with_retry_settings(self, retry: &RetrySettings) -> Self {
        self.with_fetch_policy(RetryPolicy::from(&retry.fetch))
            .with_ingest_policy(RetryPolicy::from(&retry.ingest))
    }

    /// Drive one run to a terminal state. Never fails; the outcome is in the report.
    pub async fn run(
        &self,
        reference: &RepositoryReference,
        target: &CollectionTarget,
        cancel: &CancellationToken,
    ) -> PipelineReport {
        let started = Instant::now();
        let repo = reference.as_str();
        let mut report = PipelineReport::new(reference.clone());

        report.enter(PipelineState::Fetching);
        let fetched = run_with_retry(&self.fetch_policy, Stage::Fetching, repo, cancel, |_| {
            self.provider.fetch(reference)
        })
        .await;

        let workspace = match fetched {
            RetryOutcome::Succeeded { value, attempts } => {
                report.fetch_attempts = attempts;
                value
            }
            RetryOutcome::Exhausted { error, attempts } => {
                report.fetch_attempts = attempts;
                return report.finish(
                    PipelineOutcome::FailedAfterRetries {
                        stage: Stage::Fetching,
                        attempts,
                        last_error: error.to_string(),
                    },
                    started,
                );
            }
            RetryOutcome::Cancelled { attempts } => {
                report.fetch_attempts = attempts;
                return report.finish(
                    PipelineOutcome::Cancelled {
                        stage: Stage::Fetching,
                    },
                    started,
                );
            }
        };

        report.enter(PipelineState::Ingesting);
        let ingested = run_with_retry(&self.ingest_policy, Stage::Ingesting, repo, cancel, |_| {
            self.indexer.ingest(&workspace, target)
        })
        .await;

        let outcome = match ingested {
            RetryOutcome::Succeeded { value, attempts } => {
                report.ingest_attempts = attempts;
                report.ingest = Some(value);
                PipelineOutcome::Succeeded
            }
            RetryOutcome::Exhausted { error, attempts } => {
                report.ingest_attempts = attempts;
                PipelineOutcome::FailedAfterRetries {
                    stage: Stage::Ingesting,
                    attempts,
                    last_error: error.to_string(),
                }
            }
            RetryOutcome::Cancelled { attempts } => {
                report.ingest_attempts = attempts;
                PipelineOutcome::Cancelled {
                    stage: Stage::Ingesting,
                }
            }
        };

        // Runs even after cancellation
        report.enter(PipelineState::CleaningUp);
        report.cleanup = match self.provider.destroy(&workspace).await {
            Ok(()) => CleanupStatus::Removed,
            Err(e) => {
                warn!(repo, path = ?workspace.path(), error = %e, "Workspace cleanup failed");
                CleanupStatus::Failed(e.to_string())
            }
        };

        let report = report.finish(outcome, started);
        info!(
            repo,
            outcome = %report.outcome,
            duration_ms = report.duration_ms,
            "Pipeline run finished"
        );
        report
    }
}
