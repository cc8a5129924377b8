//! Progress events streamed while a run executes.

use crate::utils::{now_utc, RunId, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// What kind of transition an event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressEventKind {
    /// The run moved to Running.
    RunStarted,
    /// A stage attempt started.
    Started,
    /// A search query was issued.
    ToolCallStarted,
    /// A search query returned or failed.
    ToolCallFinished,
    /// A stage failed retryably and will be tried again.
    Retrying,
    /// A stage succeeded.
    Succeeded,
    /// A stage failed for good.
    Failed,
    /// The run was cancelled.
    Cancelled,
    /// The report was stored and the run completed.
    RunCompleted,
    /// The run failed.
    RunFailed,
}

impl ProgressEventKind {
    /// Stable dotted name used in logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RunStarted => "run.started",
            Self::Started => "stage.started",
            Self::ToolCallStarted => "tool.started",
            Self::ToolCallFinished => "tool.finished",
            Self::Retrying => "stage.retrying",
            Self::Succeeded => "stage.succeeded",
            Self::Failed => "stage.failed",
            Self::Cancelled => "run.cancelled",
            Self::RunCompleted => "run.completed",
            Self::RunFailed => "run.failed",
        }
    }

    /// Returns true for the event that ends a run's stream.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::RunCompleted | Self::RunFailed)
    }
}

impl fmt::Display for ProgressEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transient notification of a state transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Position in the run's event order, starting at 0.
    pub seq: u64,
    /// The run this event belongs to.
    pub run_id: RunId,
    /// Stage name, absent for run-level events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    /// Event kind.
    pub kind: ProgressEventKind,
    /// Optional detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// When the event was created.
    pub timestamp: Timestamp,
}

impl ProgressEvent {
    /// Creates a run-level event.
    #[must_use]
    pub fn run(run_id: RunId, kind: ProgressEventKind) -> Self {
        Self {
            seq: 0,
            run_id,
            stage: None,
            kind,
            message: None,
            timestamp: now_utc(),
        }
    }

    /// Creates a stage-level event.
    #[must_use]
    pub fn stage(run_id: RunId, stage: impl Into<String>, kind: ProgressEventKind) -> Self {
        Self {
            stage: Some(stage.into()),
            ..Self::run(run_id, kind)
        }
    }

    /// Adds a detail message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Sets the sequence number.
    #[must_use]
    pub fn with_seq(mut self, seq: u64) -> Self {
        self.seq = seq;
        self
    }
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.run_id.short(), self.kind)?;
        if let Some(stage) = &self.stage {
            write!(f, " {stage}")?;
        }
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_event() {
        let id = RunId::new();
        let event = ProgressEvent::stage(id, "local_expertise", ProgressEventKind::Started)
            .with_message("attempt 1")
            .with_seq(4);
        assert_eq!(event.stage.as_deref(), Some("local_expertise"));
        assert_eq!(event.seq, 4);
        assert_eq!(
            event.to_string(),
            format!("[{}] stage.started local_expertise: attempt 1", id.short())
        );
    }

    #[test]
    fn test_terminal_kinds() {
        assert!(ProgressEventKind::RunCompleted.is_terminal());
        assert!(ProgressEventKind::Cancelled.is_terminal());
        assert!(!ProgressEventKind::Failed.is_terminal());
    }

    #[test]
    fn test_event_serialization() {
        let event = ProgressEvent::run(RunId::new(), ProgressEventKind::RunStarted);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "run_started");
        assert!(json.get("stage").is_none());

        let back: ProgressEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back.kind, ProgressEventKind::RunStarted);
    }
}
