use thiserror::Error;
use tokio_cron_scheduler::JobSchedulerError;

#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Raised by tokio-cron-scheduler itself
    #[error("cron scheduler: {0}")]
    Scheduler(String),

    #[error("bad cron expression {0}")]
    InvalidCron(String),

    #[error("unknown timezone {0:?}")]
    InvalidTimezone(String),

    #[error("no job named {0:?}")]
    JobNotFound(String),

    #[error("scheduler already started")]
    AlreadyRunning,

    #[error("scheduler not started")]
    NotRunning,

    /// Shutdown has begun; nothing new is accepted
    #[error("scheduler is shutting down")]
    ShuttingDown,
}

impl From<JobSchedulerError> for SchedulerError {
    fn from(err: JobSchedulerError) -> Self {
        SchedulerError::Scheduler(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_input() {
        assert_eq!(
            SchedulerError::InvalidCron("'x': bad".to_string()).to_string(),
            "bad cron expression 'x': bad"
        );
        assert_eq!(
            SchedulerError::InvalidTimezone("Mars/Base".to_string()).to_string(),
            "unknown timezone \"Mars/Base\""
        );
        assert!(SchedulerError::ShuttingDown.to_string().contains("shutting down"));
    }
}
