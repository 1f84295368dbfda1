//! Per-stage retry policy.
//!
//! A policy with retry budget `R` attempts an operation at most `R + 1`
//! times. Delays come from an [`ExponentialBackoff`] with randomization
//! disabled, so a multiplier of 1.0 yields a fixed delay.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use refresh_types::{Stage, StageRetrySettings};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Retry count, delays and per-attempt timeout for one stage.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub delay: Duration,
    /// Growth factor between delays (1.0 = fixed)
    pub multiplier: f64,
    /// Cap for any single delay
    pub max_delay: Duration,
    /// Attempts running longer than this count as failed
    pub attempt_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&StageRetrySettings::default())
    }
}

impl From<&StageRetrySettings> for RetryPolicy {
    fn from(settings: &StageRetrySettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            delay: Duration::from_secs(settings.delay_secs),
            multiplier: settings.backoff_multiplier,
            max_delay: Duration::from_secs(settings.max_delay_secs),
            attempt_timeout: (settings.attempt_timeout_secs > 0)
                .then(|| Duration::from_secs(settings.attempt_timeout_secs)),
        }
    }
}

impl RetryPolicy {
    /// Fixed delay between attempts.
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self {
            max_retries,
            delay,
            multiplier: 1.0,
            max_delay: delay,
            attempt_timeout: None,
        }
    }

    pub fn with_backoff(mut self, multiplier: f64, max_delay: Duration) -> Self {
        self.multiplier = multiplier;
        self.max_delay = max_delay;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    /// Total attempts allowed.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.delay)
            .with_randomization_factor(0.0)
            .with_multiplier(self.multiplier.max(1.0))
            .with_max_interval(self.max_delay.max(self.delay))
            .with_max_elapsed_time(None)
            .build()
    }

    /// The waits between consecutive attempts, in order.
    pub fn delays(&self) -> Vec<Duration> {
        let mut backoff = self.backoff();
        (0..self.max_retries)
            .map(|_| backoff.next_backoff().unwrap_or(self.max_delay))
            .collect()
    }
}

/// Why a single attempt failed.
#[derive(Debug)]
pub enum AttemptError<E> {
    Failed(E),
    TimedOut(Duration),
}

impl<E: fmt::Display> fmt::Display for AttemptError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptError::Failed(e) => e.fmt(f),
            AttemptError::TimedOut(limit) => write!(f, "attempt timed out after {limit:?}"),
        }
    }
}

/// Result of running an operation under a [`RetryPolicy`].
#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    Succeeded { value: T, attempts: u32 },
    Exhausted { error: AttemptError<E>, attempts: u32 },
    Cancelled { attempts: u32 },
}

/// Run `op` until it succeeds, the budget is spent, or `cancel` fires.
///
/// `op` receives the 1-based attempt number. Cancellation interrupts both an
/// in-flight attempt and a pending delay.
pub async fn run_with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    stage: Stage,
    repo: &str,
    cancel: &CancellationToken,
    mut op: F,
) -> RetryOutcome<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let mut backoff = policy.backoff();
    let mut attempts = 0;

    loop {
        if cancel.is_cancelled() {
            return RetryOutcome::Cancelled { attempts };
        }

        attempts += 1;
        debug!(repo, stage = %stage, attempt = attempts, "Starting attempt");

        let attempt = async {
            match policy.attempt_timeout {
                Some(limit) => match tokio::time::timeout(limit, op(attempts)).await {
                    Ok(result) => result.map_err(AttemptError::Failed),
                    Err(_) => Err(AttemptError::TimedOut(limit)),
                },
                None => op(attempts).await.map_err(AttemptError::Failed),
            }
        };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return RetryOutcome::Cancelled { attempts },
            result = attempt => result,
        };

        let error = match result {
            Ok(value) => return RetryOutcome::Succeeded { value, attempts },
            Err(e) => e,
        };

        if attempts >= policy.max_attempts() {
            error!(repo, stage = %stage, attempts, error = %error, "Retries exhausted");
            return RetryOutcome::Exhausted { error, attempts };
        }

        let delay = backoff.next_backoff().unwrap_or(policy.max_delay);
        warn!(
            repo,
            stage = %stage,
            attempt = attempts,
            error = %error,
            retry_in_ms = delay.as_millis() as u64,
            "Attempt failed, retrying"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return RetryOutcome::Cancelled { attempts },
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
