//! # refresh-pipeline
//!
//! The ingestion core: one [`RepositoryPipeline`] run per repository
//! (fetch → ingest → cleanup, each working stage retried under its own
//! [`RetryPolicy`]), and the [`FanOutScheduler`] that runs a whole reference
//! list through a bounded pool and collects one report per reference.
//!
//! Failures never escape a run: they become a [`PipelineOutcome`] in the
//! run's [`PipelineReport`].
//!
//! [`PipelineOutcome`]: refresh_types::PipelineOutcome

pub mod fanout;
pub mod pipeline;
pub mod retry;

pub use fanout::{CycleReport, FanOutScheduler};
pub use pipeline::{CleanupStatus, PipelineReport, RepositoryPipeline};
pub use retry::{run_with_retry, AttemptError, RetryOutcome, RetryPolicy};
