//! Stage and run status enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The outcome of one stage attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// The stage produced a well-formed output.
    Succeeded,
    /// The stage failed for a reason worth retrying (network, quota, timeout).
    FailedRetryable,
    /// The stage failed in a way retries cannot fix (malformed or refused output).
    FailedFatal,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::FailedRetryable => write!(f, "failed_retryable"),
            Self::FailedFatal => write!(f, "failed_fatal"),
        }
    }
}

impl StageStatus {
    /// Returns true if the status indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    /// Returns true if the status indicates failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        !self.is_success()
    }

    /// Returns true if the controller may retry the stage.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::FailedRetryable)
    }
}

/// The lifecycle status of a pipeline run.
///
/// Transitions are monotonic: `Pending -> Running -> {Completed | Failed | Cancelled}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Created, no stage started yet.
    #[default]
    Pending,
    /// Stages are executing.
    Running,
    /// All stages succeeded and the report was written.
    Completed,
    /// A stage failed fatally, exhausted its retries, or the report could not be written.
    Failed,
    /// The user cancelled the run.
    Cancelled,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl RunStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns true if moving to `next` keeps the lifecycle monotonic.
    #[must_use]
    pub fn can_transition_to(&self, next: Self) -> bool {
        match self {
            Self::Pending => matches!(next, Self::Running | Self::Failed | Self::Cancelled),
            Self::Running => next.is_terminal(),
            Self::Completed | Self::Failed | Self::Cancelled => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_status_display() {
        assert_eq!(StageStatus::Succeeded.to_string(), "succeeded");
        assert_eq!(StageStatus::FailedRetryable.to_string(), "failed_retryable");
        assert_eq!(StageStatus::FailedFatal.to_string(), "failed_fatal");
    }

    #[test]
    fn test_stage_status_predicates() {
        assert!(StageStatus::Succeeded.is_success());
        assert!(StageStatus::FailedRetryable.is_retryable());
        assert!(!StageStatus::FailedFatal.is_retryable());
        assert!(StageStatus::FailedFatal.is_failure());
    }

    #[test]
    fn test_run_status_is_terminal() {
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::Cancelled.is_terminal());
        assert!(!RunStatus::Pending.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
    }

    #[test]
    fn test_terminal_states_never_transition() {
        let all = [
            RunStatus::Pending,
            RunStatus::Running,
            RunStatus::Completed,
            RunStatus::Failed,
            RunStatus::Cancelled,
        ];
        for terminal in all.iter().filter(|s| s.is_terminal()) {
            for next in all {
                assert!(!terminal.can_transition_to(next), "{terminal} -> {next}");
            }
        }
    }

    #[test]
    fn test_forward_transitions() {
        assert!(RunStatus::Pending.can_transition_to(RunStatus::Running));
        assert!(RunStatus::Pending.can_transition_to(RunStatus::Cancelled));
        assert!(RunStatus::Running.can_transition_to(RunStatus::Completed));
        assert!(!RunStatus::Running.can_transition_to(RunStatus::Pending));
        assert!(!RunStatus::Pending.can_transition_to(RunStatus::Completed));
    }

    #[test]
    fn test_status_serialize() {
        let json = serde_json::to_string(&StageStatus::FailedRetryable).unwrap();
        assert_eq!(json, r#""failed_retryable""#);

        let status: RunStatus = serde_json::from_str(r#""cancelled""#).unwrap();
        assert_eq!(status, RunStatus::Cancelled);
    }
}
