//! Jobs registered by the daemon.
//!
//! - **refresh**: one fan-out refresh cycle over the configured repositories

pub mod refresh;

pub use refresh::{create_refresh_job, run_refresh_cycle, RefreshJobConfig, REFRESH_JOB_NAME};
