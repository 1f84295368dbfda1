//! Cron-driven job runner on tokio-cron-scheduler.
//!
//! Every registered job runs through the same tick wrapper: shutdown check,
//! overlap guard, jitter, the job itself, then a registry update. Ticks are
//! tracked so shutdown can wait for a running job.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono_tz::Tz;
use tokio::task::JoinHandle;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::{
    parse_timezone, JitterConfig, JobOutput, JobRegistry, JobResult, OverlapGuard, OverlapPolicy,
    SchedulerConfig, SchedulerError,
};

type TickFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
type TickFn = Arc<dyn Fn() -> TickFuture + Send + Sync>;

/// Accept 5-field cron (minute first) by prepending a seconds field.
///
/// ```
/// use refresh_scheduler::normalize_cron_expression;
///
/// assert_eq!(normalize_cron_expression("0 0 * * *"), "0 0 0 * * *");
/// assert_eq!(normalize_cron_expression("30 0 0 * * *"), "30 0 0 * * *");
/// ```
pub fn normalize_cron_expression(expr: &str) -> String {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    if fields.len() == 5 {
        format!("0 {}", fields.join(" "))
    } else {
        fields.join(" ")
    }
}

/// Validate a cron expression (5 or 6 fields).
///
/// ```
/// use refresh_scheduler::validate_cron_expression;
///
/// assert!(validate_cron_expression("0 0 0 * * *").is_ok());
/// assert!(validate_cron_expression("0 0 * * *").is_ok());
/// assert!(validate_cron_expression("invalid").is_err());
/// ```
pub fn validate_cron_expression(expr: &str) -> Result<(), SchedulerError> {
    let normalized = normalize_cron_expression(expr);
    match Job::new_async(normalized.as_str(), |_uuid, _lock| Box::pin(async {})) {
        Ok(_) => Ok(()),
        Err(e) => Err(SchedulerError::InvalidCron(format!("'{}': {}", expr, e))),
    }
}

/// Lifecycle owner for scheduled jobs.
pub struct SchedulerService {
    scheduler: JobScheduler,
    config: SchedulerConfig,
    shutdown_token: CancellationToken,
    is_running: AtomicBool,
    registry: Arc<JobRegistry>,
    tracker: TaskTracker,
    ticks: Mutex<HashMap<String, TickFn>>,
}

impl SchedulerService {
    /// Create the service. Jobs only fire after [`start`](Self::start).
    pub async fn new(config: SchedulerConfig) -> Result<Self, SchedulerError> {
        let scheduler = JobScheduler::new().await?;

        Ok(Self {
            scheduler,
            config,
            shutdown_token: CancellationToken::new(),
            is_running: AtomicBool::new(false),
            registry: Arc::new(JobRegistry::new()),
            tracker: TaskTracker::new(),
            ticks: Mutex::new(HashMap::new()),
        })
    }

    pub async fn start(&self) -> Result<(), SchedulerError> {
        if self.shutdown_token.is_cancelled() {
            return Err(SchedulerError::ShuttingDown);
        }
        if self.is_running.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyRunning);
        }

        self.scheduler.start().await?;
        info!(jobs = self.registry.job_count(), "Scheduler started");

        Ok(())
    }

    /// Stop firing ticks and wait for running jobs.
    ///
    /// Cancels the shared token so in-flight jobs wind down, then waits up to
    /// `shutdown_grace` before stopping the cron loop.
    pub async fn shutdown(&mut self) -> Result<(), SchedulerError> {
        if !self.is_running.load(Ordering::SeqCst) {
            return Err(SchedulerError::NotRunning);
        }

        info!(jobs = self.registry.job_count(), "Stopping scheduler");
        self.shutdown_token.cancel();
        self.tracker.close();

        let grace = self.config.shutdown_grace;
        if tokio::time::timeout(grace, self.tracker.wait()).await.is_err() {
            warn!(
                grace_ms = grace.as_millis() as u64,
                running = self.tracker.len(),
                "Jobs still running at shutdown timeout"
            );
        }

        if let Err(e) = self.scheduler.shutdown().await {
            warn!(error = %e, "Cron loop did not stop cleanly");
        }

        self.is_running.store(false, Ordering::SeqCst);
        info!("Scheduler stopped");

        Ok(())
    }

    /// Token cancelled when shutdown begins.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    pub fn registry(&self) -> Arc<JobRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Register a cron job.
    ///
    /// `timezone` falls back to the configured default. `job_fn` receives the
    /// shutdown token; an `Err` or a [`JobOutput`] with a failure is recorded
    /// as [`JobResult::Failed`].
    pub async fn register_job<F, Fut>(
        &self,
        name: &str,
        cron_expr: &str,
        timezone: Option<&str>,
        overlap: OverlapPolicy,
        jitter: JitterConfig,
        job_fn: F,
    ) -> Result<uuid::Uuid, SchedulerError>
    where
        F: Fn(CancellationToken) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<JobOutput, String>> + Send + 'static,
    {
        if self.shutdown_token.is_cancelled() {
            return Err(SchedulerError::ShuttingDown);
        }

        let tz: Tz = match timezone {
            Some(name) => parse_timezone(name)?,
            None => self.config.default_timezone,
        };

        validate_cron_expression(cron_expr)?;
        let cron = normalize_cron_expression(cron_expr);

        let tick: TickFn = {
            let name = name.to_string();
            let guard = Arc::new(OverlapGuard::new(overlap));
            let registry = Arc::clone(&self.registry);
            let token = self.shutdown_token.clone();
            Arc::new(move || {
                Box::pin(run_tick(
                    name.clone(),
                    Arc::clone(&guard),
                    jitter,
                    Arc::clone(&registry),
                    token.clone(),
                    job_fn.clone(),
                )) as TickFuture
            })
        };

        let job = {
            let tick = Arc::clone(&tick);
            let tracker = self.tracker.clone();
            Job::new_async_tz(cron.as_str(), tz, move |_uuid, _lock| {
                let run = tracker.track_future(tick());
                Box::pin(async move { run.await })
            })
            .map_err(|e| SchedulerError::InvalidCron(format!("'{}': {}", cron_expr, e)))?
        };

        self.registry.register(name, &cron);
        self.ticks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string(), tick);

        let uuid = self.scheduler.add(job).await?;
        info!(
            job = %name,
            uuid = %uuid,
            cron = %cron,
            timezone = %tz.name(),
            overlap = ?overlap,
            jitter_secs = jitter.max_jitter_secs,
            "Job registered"
        );

        Ok(uuid)
    }

    /// Fire a registered job now, outside its schedule.
    ///
    /// The run goes through the same overlap guard as scheduled ticks.
    pub fn trigger(&self, name: &str) -> Result<JoinHandle<()>, SchedulerError> {
        if self.shutdown_token.is_cancelled() {
            return Err(SchedulerError::ShuttingDown);
        }
        let tick = self
            .ticks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
            .ok_or_else(|| SchedulerError::JobNotFound(name.to_string()))?;

        debug!(job = %name, "Manual trigger");
        Ok(self.tracker.spawn(tick()))
    }
}

async fn run_tick<F, Fut>(
    name: String,
    guard: Arc<OverlapGuard>,
    jitter: JitterConfig,
    registry: Arc<JobRegistry>,
    token: CancellationToken,
    job_fn: F,
) where
    F: Fn(CancellationToken) -> Fut,
    Fut: Future<Output = Result<JobOutput, String>>,
{
    if token.is_cancelled() {
        debug!(job = %name, "Shutdown in progress, tick ignored");
        return;
    }

    let acquired = tokio::select! {
        biased;
        _ = token.cancelled() => return,
        acquired = guard.acquire() => acquired,
    };
    let Some(_run) = acquired else {
        info!(job = %name, policy = ?guard.policy(), "Previous run still active, tick skipped");
        registry.record_skipped(&name, "previous run still active");
        return;
    };

    let delay = jitter.generate_jitter();
    if !delay.is_zero() {
        debug!(job = %name, jitter_ms = delay.as_millis() as u64, "Delaying start");
        tokio::select! {
            biased;
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    registry.record_start(&name);
    info!(job = %name, "Job started");
    let start = Instant::now();
    let result = job_fn(token).await;
    let elapsed = start.elapsed();
    let duration_ms = elapsed.as_millis() as u64;

    let (outcome, metadata) = match result {
        Ok(output) => {
            match &output.failure {
                Some(reason) => {
                    warn!(job = %name, duration_ms, reason = %reason, "Job completed with failures")
                }
                None => info!(job = %name, duration_ms, "Job completed"),
            }
            (output.result(), output.metadata)
        }
        Err(e) => {
            error!(job = %name, duration_ms, error = %e, "Job failed");
            (JobResult::Failed(e), HashMap::new())
        }
    };
    registry.record_finish(&name, outcome, elapsed, metadata);
}
