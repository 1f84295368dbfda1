//! Bounded fan-out of pipeline runs over a reference list.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use refresh_types::{CollectionTarget, PipelineOutcome, RepositoryReference};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use ulid::Ulid;

use crate::pipeline::{PipelineReport, RepositoryPipeline};

/// Result of one cycle: one report per input reference, in input order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    pub cycle_id: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub reports: Vec<PipelineReport>,
}

impl CycleReport {
    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| r.outcome.is_success())
            .count()
    }

    pub fn failed(&self) -> usize {
        self.len() - self.succeeded()
    }

    /// True when every run succeeded.
    pub fn is_clean(&self) -> bool {
        self.failed() == 0
    }

    /// Outcome of the first run for `reference`.
    pub fn outcome_for(&self, reference: &RepositoryReference) -> Option<&PipelineOutcome> {
        self.reports
            .iter()
            .find(|r| &r.reference == reference)
            .map(|r| &r.outcome)
    }
}

/// Runs one pipeline per reference with at most `max_concurrency` in flight.
pub struct FanOutScheduler {
    pipeline: Arc<RepositoryPipeline>,
    max_concurrency: usize,
}

impl FanOutScheduler {
    /// A bound of 0 is raised to 1.
    pub fn new(pipeline: Arc<RepositoryPipeline>, max_concurrency: usize) -> Self {
        Self {
            pipeline,
            max_concurrency: max_concurrency.max(1),
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Run every reference to a terminal state.
    ///
    /// All runs are spawned up front and queue on the pool. Duplicate
    /// references run independently. A run that fails (or panics) never
    /// affects the others.
    pub async fn run_all(
        &self,
        references: &[RepositoryReference],
        target: &CollectionTarget,
        cancel: &CancellationToken,
    ) -> CycleReport {
        let cycle_id = Ulid::new().to_string();
        let started_at = Utc::now();
        let started = Instant::now();

        info!(
            cycle_id = %cycle_id,
            repos = references.len(),
            max_concurrency = self.max_concurrency,
            collection = %target,
            "Cycle started"
        );

        let permits = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();
        let mut positions = HashMap::with_capacity(references.len());

        for (position, reference) in references.iter().enumerate() {
            let pipeline = Arc::clone(&self.pipeline);
            let permits = Arc::clone(&permits);
            let reference = reference.clone();
            let target = target.clone();
            let cancel = cancel.clone();

            let handle = tasks.spawn(async move {
                let report = match permits.acquire_owned().await {
                    Ok(_permit) => pipeline.run(&reference, &target, &cancel).await,
                    Err(_) => PipelineReport::aborted(reference, "concurrency pool closed"),
                };
                (position, report)
            });
            positions.insert(handle.id(), position);
        }

        let mut slots: Vec<Option<PipelineReport>> = (0..references.len()).map(|_| None).collect();
        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((_, (position, report))) => slots[position] = Some(report),
                Err(e) => {
                    if let Some(&position) = positions.get(&e.id()) {
                        warn!(repo = %references[position], error = %e, "Pipeline task died");
                        slots[position] =
                            Some(PipelineReport::aborted(references[position].clone(), e.to_string()));
                    }
                }
            }
        }

        let reports: Vec<PipelineReport> = slots
            .into_iter()
            .zip(references)
            .map(|(slot, reference)| {
                slot.unwrap_or_else(|| PipelineReport::aborted(reference.clone(), "no result"))
            })
            .collect();

        let report = CycleReport {
            cycle_id,
            started_at,
            duration_ms: started.elapsed().as_millis().try_into().unwrap_or(u64::MAX),
            reports,
        };

        for run in &report.reports {
            if run.outcome.is_success() {
                info!(cycle_id = %report.cycle_id, repo = %run.reference, "Repository refreshed");
            } else {
                warn!(
                    cycle_id = %report.cycle_id,
                    repo = %run.reference,
                    outcome = %run.outcome,
                    "Repository refresh failed"
                );
            }
        }
        info!(
            cycle_id = %report.cycle_id,
            succeeded = report.succeeded(),
            failed = report.failed(),
            duration_ms = report.duration_ms,
            "Cycle finished"
        );

        report
    }
}
