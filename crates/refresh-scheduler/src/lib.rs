//! Cron trigger for repo-refresh.
//!
//! Wraps `tokio-cron-scheduler` with timezone-aware schedules, an explicit
//! overlap policy, start jitter, a status registry and graceful shutdown.
//!
//! # Example
//!
//! ```ignore
//! use refresh_scheduler::{SchedulerService, SchedulerConfig, OverlapPolicy, JitterConfig, JobOutput};
//!
//! let scheduler = SchedulerService::new(SchedulerConfig::default()).await?;
//! scheduler.register_job(
//!     "nightly-refresh",
//!     "0 0 0 * * *",
//!     None,
//!     OverlapPolicy::Skip,
//!     JitterConfig::none(),
//!     |_cancel| async { Ok(JobOutput::new()) },
//! ).await?;
//! scheduler.start().await?;
//! ```

mod config;
mod error;
mod jitter;
mod overlap;
mod registry;
mod scheduler;

#[cfg(feature = "jobs")]
pub mod jobs;

pub use config::{parse_timezone, SchedulerConfig};
pub use error::SchedulerError;
pub use jitter::JitterConfig;
pub use overlap::{OverlapGuard, RunGuard};
pub use refresh_types::OverlapPolicy;
pub use registry::{JobOutput, JobRegistry, JobResult, JobStatus};
pub use scheduler::{normalize_cron_expression, validate_cron_expression, SchedulerService};

#[cfg(feature = "jobs")]
pub use jobs::{create_refresh_job, run_refresh_cycle, RefreshJobConfig, REFRESH_JOB_NAME};
