//! Pipeline stages, states and terminal outcomes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A working stage of a repository pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetching,
    Ingesting,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Fetching => "fetching",
            Stage::Ingesting => "ingesting",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of the per-repository state machine.
///
/// `Pending -> Fetching -> Ingesting -> CleaningUp -> Done`, or `Failed`
/// from any working state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Pending,
    Fetching,
    Ingesting,
    CleaningUp,
    Done,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }
}

/// Terminal result of one pipeline run.
///
/// Cleanup problems never appear here; they are warnings attached to the run
/// report, not outcomes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PipelineOutcome {
    /// Fetch and ingest both succeeded
    Succeeded,

    /// A stage exhausted its retry budget
    FailedAfterRetries {
        stage: Stage,
        attempts: u32,
        last_error: String,
    },

    /// Shutdown reached the run before it finished
    Cancelled { stage: Stage },

    /// The run's task died without producing an outcome
    Aborted { reason: String },
}

impl PipelineOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, PipelineOutcome::Succeeded)
    }

    /// The stage a failed or cancelled run stopped in.
    pub fn failed_stage(&self) -> Option<Stage> {
        match self {
            PipelineOutcome::FailedAfterRetries { stage, .. }
            | PipelineOutcome::Cancelled { stage } => Some(*stage),
            PipelineOutcome::Succeeded | PipelineOutcome::Aborted { .. } => None,
        }
    }
}

impl fmt::Display for PipelineOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineOutcome::Succeeded => f.write_str("succeeded"),
            PipelineOutcome::FailedAfterRetries {
                stage,
                attempts,
                last_error,
            } => write!(
                f,
                "failed while {stage} after {attempts} attempt(s): {last_error}"
            ),
            PipelineOutcome::Cancelled { stage } => write!(f, "cancelled while {stage}"),
            PipelineOutcome::Aborted { reason } => write!(f, "aborted: {reason}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(PipelineState::Done.is_terminal());
        assert!(PipelineState::Failed.is_terminal());
        assert!(!PipelineState::Pending.is_terminal());
        assert!(!PipelineState::CleaningUp.is_terminal());
    }

    #[test]
    fn test_failed_stage() {
        let outcome = PipelineOutcome::FailedAfterRetries {
            stage: Stage::Ingesting,
            attempts: 3,
            last_error: "store unavailable".to_string(),
        };
        assert_eq!(outcome.failed_stage(), Some(Stage::Ingesting));
        assert!(!outcome.is_success());
        assert_eq!(PipelineOutcome::Succeeded.failed_stage(), None);
    }

    #[test]
    fn test_outcome_display() {
        let outcome = PipelineOutcome::FailedAfterRetries {
            stage: Stage::Fetching,
            attempts: 4,
            last_error: "not found".to_string(),
        };
        assert_eq!(
            outcome.to_string(),
            "failed while fetching after 4 attempt(s): not found"
        );
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = PipelineOutcome::Cancelled {
            stage: Stage::Ingesting,
        };
        let json = serde_json::to_string(&outcome).unwrap();
        assert_eq!(json, r#"{"status":"cancelled","stage":"ingesting"}"#);
        let back: PipelineOutcome = serde_json::from_str(&json).unwrap();
        assert_eq!(back, outcome);
    }
}
