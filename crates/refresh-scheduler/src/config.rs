use std::time::Duration;

use chrono_tz::Tz;

use refresh_types::TriggerSettings;

use crate::SchedulerError;

/// Service-wide settings, resolved and validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Used by jobs registered without their own timezone
    pub default_timezone: Tz,
    /// How long shutdown waits for in-flight runs
    pub shutdown_grace: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_timezone: Tz::UTC,
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

impl SchedulerConfig {
    pub fn from_trigger(trigger: &TriggerSettings) -> Result<Self, SchedulerError> {
        Ok(Self {
            default_timezone: parse_timezone(&trigger.timezone)?,
            shutdown_grace: Duration::from_secs(trigger.shutdown_timeout_secs),
        })
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }
}

/// Parse an IANA zone name such as "Europe/Paris".
pub fn parse_timezone(name: &str) -> Result<Tz, SchedulerError> {
    name.parse()
        .map_err(|_| SchedulerError::InvalidTimezone(name.to_string()))
}
