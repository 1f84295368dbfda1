//! Per-job run history kept in memory.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of one tick.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobResult {
    Success,
    Failed(String),
    /// The tick never ran (overlap policy)
    Skipped(String),
}

/// What a job reports back after a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobOutput {
    pub metadata: HashMap<String, String>,
    /// Set when the run completed but should be recorded as failed
    pub failure: Option<String>,
}

impl JobOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.metadata.insert(key.into(), value.to_string());
        self
    }

    pub fn failed(mut self, reason: impl Into<String>) -> Self {
        self.failure = Some(reason.into());
        self
    }

    /// The registry result this output maps to.
    pub fn result(&self) -> JobResult {
        match &self.failure {
            Some(reason) => JobResult::Failed(reason.clone()),
            None => JobResult::Success,
        }
    }
}

/// Counters and last-run details for one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatus {
    pub job_name: String,
    pub cron_expr: String,
    /// Set while a run is in flight
    pub running_since: Option<DateTime<Utc>>,
    /// When the last run finished
    pub last_run: Option<DateTime<Utc>>,
    pub last_duration_ms: Option<u64>,
    pub last_result: Option<JobResult>,
    /// Finished runs; skipped ticks are counted separately
    pub run_count: u64,
    pub error_count: u64,
    pub skip_count: u64,
    #[serde(default)]
    pub last_run_metadata: HashMap<String, String>,
}

impl JobStatus {
    fn registered(job_name: &str, cron_expr: &str) -> Self {
        Self {
            job_name: job_name.to_string(),
            cron_expr: cron_expr.to_string(),
            running_since: None,
            last_run: None,
            last_duration_ms: None,
            last_result: None,
            run_count: 0,
            error_count: 0,
            skip_count: 0,
            last_run_metadata: HashMap::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running_since.is_some()
    }
}

/// Shared between the scheduler and the ticks it spawns.
///
/// Updates for names that were never registered are dropped.
#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<String, JobStatus>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, JobStatus>> {
        self.jobs.read().unwrap_or_else(|e| e.into_inner())
    }

    fn update(&self, job_name: &str, f: impl FnOnce(&mut JobStatus)) {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        if let Some(status) = jobs.get_mut(job_name) {
            f(status);
        }
    }

    /// Re-registering a name resets its history.
    pub fn register(&self, job_name: &str, cron_expr: &str) {
        self.jobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(job_name.to_string(), JobStatus::registered(job_name, cron_expr));
    }

    pub fn record_start(&self, job_name: &str) {
        self.update(job_name, |s| s.running_since = Some(Utc::now()));
    }

    pub fn record_finish(
        &self,
        job_name: &str,
        result: JobResult,
        elapsed: Duration,
        metadata: HashMap<String, String>,
    ) {
        self.update(job_name, |s| {
            s.running_since = None;
            s.last_run = Some(Utc::now());
            s.last_duration_ms = Some(elapsed.as_millis().try_into().unwrap_or(u64::MAX));
            s.run_count += 1;
            s.error_count += u64::from(matches!(result, JobResult::Failed(_)));
            s.last_result = Some(result);
            s.last_run_metadata = metadata;
        });
    }

    /// A tick dropped by the overlap policy. Any in-flight run is left alone.
    pub fn record_skipped(&self, job_name: &str, reason: &str) {
        self.update(job_name, |s| {
            s.skip_count += 1;
            s.last_result = Some(JobResult::Skipped(reason.to_string()));
        });
    }

    pub fn get_status(&self, job_name: &str) -> Option<JobStatus> {
        self.read().get(job_name).cloned()
    }

    /// Every job, ordered by name.
    pub fn get_all_status(&self) -> Vec<JobStatus> {
        let mut all: Vec<JobStatus> = self.read().values().cloned().collect();
        all.sort_by(|a, b| a.job_name.cmp(&b.job_name));
        all
    }

    pub fn is_running(&self, job_name: &str) -> bool {
        self.read().get(job_name).is_some_and(JobStatus::is_running)
    }

    pub fn is_registered(&self, job_name: &str) -> bool {
        self.read().contains_key(job_name)
    }

    pub fn job_count(&self) -> usize {
        self.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const NIGHTLY: &str = "0 0 0 * * *";

    #[test]
    fn test_register_and_get() {
        let registry = JobRegistry::new();
        registry.register("refresh", NIGHTLY);

        let status = registry.get_status("refresh").unwrap();
        assert_eq!(status.cron_expr, NIGHTLY);
        assert_eq!(status.run_count, 0);
        assert!(!status.is_running());
        assert!(registry.is_registered("refresh"));
        assert!(registry.get_status("other").is_none());
    }

    #[test]
    fn test_run_lifecycle() {
        let registry = JobRegistry::new();
        registry.register("refresh", NIGHTLY);

        registry.record_start("refresh");
        assert!(registry.is_running("refresh"));
        assert!(registry.get_status("refresh").unwrap().running_since.is_some());

        let output = JobOutput::new()
            .with_metadata("succeeded", 2)
            .with_metadata("failed", 0);
        registry.record_finish(
            "refresh",
            output.result(),
            Duration::from_millis(1500),
            output.metadata,
        );

        let status = registry.get_status("refresh").unwrap();
        assert!(!status.is_running());
        assert!(status.last_run.is_some());
        assert_eq!(status.last_duration_ms, Some(1500));
        assert_eq!(status.last_result, Some(JobResult::Success));
        assert_eq!(
            status.last_run_metadata.get("succeeded").map(String::as_str),
            Some("2")
        );
    }

    #[test]
    fn test_failed_output_counts_as_error() {
        let registry = JobRegistry::new();
        registry.register("refresh", NIGHTLY);

        let output = JobOutput::new().failed("1 of 2 repositories failed");
        registry.record_finish("refresh", output.result(), Duration::ZERO, output.metadata);
        registry.record_finish("refresh", JobResult::Success, Duration::ZERO, HashMap::new());

        let status = registry.get_status("refresh").unwrap();
        assert_eq!(status.run_count, 2);
        assert_eq!(status.error_count, 1);
        assert_eq!(status.last_result, Some(JobResult::Success));
    }

    #[test]
    fn test_skips_do_not_count_as_runs() {
        let registry = JobRegistry::new();
        registry.register("refresh", NIGHTLY);
        registry.record_start("refresh");

        registry.record_skipped("refresh", "previous run still active");

        let status = registry.get_status("refresh").unwrap();
        assert_eq!(status.skip_count, 1);
        assert_eq!(status.run_count, 0);
        assert!(status.is_running());
        assert!(matches!(status.last_result, Some(JobResult::Skipped(_))));
    }

    #[test]
    fn test_unknown_job_updates_are_ignored() {
        let registry = JobRegistry::new();
        registry.record_start("ghost");
        registry.record_finish("ghost", JobResult::Success, Duration::ZERO, HashMap::new());
        registry.record_skipped("ghost", "x");
        assert_eq!(registry.job_count(), 0);
        assert!(!registry.is_running("ghost"));
    }

    #[test]
    fn test_all_status_sorted_by_name() {
        let registry = JobRegistry::new();
        registry.register("b", NIGHTLY);
        registry.register("a", NIGHTLY);
        let names: Vec<String> = registry
            .get_all_status()
            .into_iter()
            .map(|s| s.job_name)
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
