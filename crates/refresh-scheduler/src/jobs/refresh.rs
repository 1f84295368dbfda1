//! The refresh job.
//!
//! Each tick runs [`FanOutScheduler::run_all`] over a fixed reference list
//! and target. There is no retry at this layer; a cycle with failed
//! repositories still completes and is recorded as failed.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;

use refresh_pipeline::FanOutScheduler;
use refresh_types::{CollectionTarget, OverlapPolicy, RepositoryReference, Settings};

use crate::{JitterConfig, JobOutput, SchedulerError, SchedulerService};

/// Registry name used when the configured trigger name is empty.
pub const REFRESH_JOB_NAME: &str = "repository_refresh";

/// Schedule and inputs of the refresh job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshJobConfig {
    pub name: String,
    /// 5 or 6 field cron (default: midnight daily)
    pub cron: String,
    pub timezone: String,
    pub overlap: OverlapPolicy,
    pub jitter_secs: u64,
    pub references: Vec<RepositoryReference>,
    pub target: CollectionTarget,
}

impl RefreshJobConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        let trigger = &settings.trigger;
        let name = if trigger.name.trim().is_empty() {
            REFRESH_JOB_NAME.to_string()
        } else {
            trigger.name.clone()
        };
        Self {
            name,
            cron: trigger.cron.clone(),
            timezone: trigger.timezone.clone(),
            overlap: trigger.overlap,
            jitter_secs: trigger.jitter_secs,
            references: settings.references(),
            target: settings.collection_target(),
        }
    }
}

/// Register the refresh job. Returns the registry name it was registered under.
pub async fn create_refresh_job(
    scheduler: &SchedulerService,
    fanout: Arc<FanOutScheduler>,
    config: RefreshJobConfig,
) -> Result<String, SchedulerError> {
    let references = Arc::new(config.references);
    let target = config.target;
    let repos = references.len();

    scheduler
        .register_job(
            &config.name,
            &config.cron,
            Some(&config.timezone),
            config.overlap,
            JitterConfig::new(config.jitter_secs),
            move |cancel| {
                let fanout = Arc::clone(&fanout);
                let references = Arc::clone(&references);
                let target = target.clone();
                async move { Ok(run_refresh_cycle(&fanout, &references, &target, &cancel).await) }
            },
        )
        .await?;

    info!(job = %config.name, repos, "Registered refresh job");
    Ok(config.name)
}

/// Run one cycle and summarize it for the registry.
pub async fn run_refresh_cycle(
    fanout: &FanOutScheduler,
    references: &[RepositoryReference],
    target: &CollectionTarget,
    cancel: &CancellationToken,
) -> JobOutput {
    let cycle = fanout.run_all(references, target, cancel).await;

    let failed: Vec<&str> = cycle
        .reports
        .iter()
        .filter(|r| !r.outcome.is_success())
        .map(|r| r.reference.as_str())
        .collect();

    let output = JobOutput::new()
        .with_metadata("cycle_id", &cycle.cycle_id)
        .with_metadata("repositories", cycle.len())
        .with_metadata("succeeded", cycle.succeeded())
        .with_metadata("failed", cycle.failed());

    if cycle.is_clean() {
        output
    } else {
        output.failed(format!(
            "{} of {} repositories failed: {}",
            failed.len(),
            cycle.len(),
            failed.join(", ")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use refresh_indexing::{Indexer, IngestError, IngestReport};
    use refresh_pipeline::{RepositoryPipeline, RetryPolicy};
    use refresh_types::Workspace;
    use refresh_workspace::{CleanupError, FetchError, WorkspaceProvider};
    use std::time::Duration;

    use crate::{JobResult, SchedulerConfig};

    /// Fetch fails for any reference containing "missing".
    struct Fake;

    #[async_trait]
    impl WorkspaceProvider for Fake {
        async fn fetch(&self, reference: &RepositoryReference) -> Result<Workspace, FetchError> {
            if reference.as_str().contains("missing") {
                return Err(FetchError::Clone {
                    reference: reference.to_string(),
                    reason: "repository not found".to_string(),
                });
            }
            Ok(Workspace::new(reference.clone(), format!("/ws/{}", reference.slug())))
        }

        async fn destroy(&self, _workspace: &Workspace) -> Result<(), CleanupError> {
            Ok(())
        }
    }

    #[async_trait]
    impl Indexer for Fake {
        async fn ingest(
            &self,
            _workspace: &Workspace,
            _target: &CollectionTarget,
        ) -> Result<IngestReport, IngestError> {
            Ok(IngestReport::default())
        }
    }

    fn fanout() -> Arc<FanOutScheduler> {
        let fake = Arc::new(Fake);
        let pipeline = RepositoryPipeline::new(fake.clone(), fake)
            .with_fetch_policy(RetryPolicy::fixed(0, Duration::ZERO));
        Arc::new(FanOutScheduler::new(Arc::new(pipeline), 2))
    }

    fn refs(names: &[&str]) -> Vec<RepositoryReference> {
        names.iter().map(|n| RepositoryReference::new(*n)).collect()
    }

    #[test]
    fn test_config_from_settings() {
        let settings = Settings::default();
        let config = RefreshJobConfig::from_settings(&settings);
        assert_eq!(config.name, settings.trigger.name);
        assert_eq!(config.cron, "0 0 0 * * *");
        assert_eq!(config.overlap, OverlapPolicy::Skip);
        assert_eq!(config.references.len(), settings.repositories.len());
        assert_eq!(config.target, settings.collection_target());
    }

    #[test]
    fn test_blank_name_falls_back() {
        let mut settings = Settings::default();
        settings.trigger.name = "  ".to_string();
        assert_eq!(RefreshJobConfig::from_settings(&settings).name, REFRESH_JOB_NAME);
    }

    #[tokio::test]
    async fn test_clean_cycle_output() {
        let output = run_refresh_cycle(
            &fanout(),
            &refs(&["https://example.com/a", "https://example.com/b"]),
            &CollectionTarget::new("/db", "c"),
            &CancellationToken::new(),
        )
        .await;

        assert_eq!(output.result(), JobResult::Success);
        assert_eq!(output.metadata.get("succeeded").map(String::as_str), Some("2"));
        assert_eq!(output.metadata.get("failed").map(String::as_str), Some("0"));
        assert!(output.metadata.contains_key("cycle_id"));
    }

    #[tokio::test]
    async fn test_partial_failure_marks_output_failed() {
        let output = run_refresh_cycle(
            &fanout(),
            &refs(&["https://example.com/a", "https://example.com/missing"]),
            &CollectionTarget::new("/db", "c"),
            &CancellationToken::new(),
        )
        .await;

        match output.result() {
            JobResult::Failed(reason) => {
                assert!(reason.starts_with("1 of 2"));
                assert!(reason.contains("https://example.com/missing"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(output.metadata.get("repositories").map(String::as_str), Some("2"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_registered_job_runs_on_trigger() {
        let scheduler = SchedulerService::new(SchedulerConfig::default()).await.unwrap();
        let config = RefreshJobConfig {
            name: "nightly-refresh".to_string(),
            cron: "0 0 * * *".to_string(),
            timezone: "UTC".to_string(),
            overlap: OverlapPolicy::Skip,
            jitter_secs: 0,
            references: refs(&["https://example.com/a"]),
            target: CollectionTarget::new("/db", "c"),
        };

        let name = create_refresh_job(&scheduler, fanout(), config).await.unwrap();
        scheduler.trigger(&name).unwrap().await.unwrap();

        let status = scheduler.registry().get_status(&name).unwrap();
        assert_eq!(status.run_count, 1);
        assert_eq!(status.last_result, Some(JobResult::Success));
        assert_eq!(
            status.last_run_metadata.get("succeeded").map(String::as_str),
            Some("1")
        );
    }
}
