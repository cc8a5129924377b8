//! The record of one pipeline run.

use super::{Context, RunStatus, StageResult, TripRequest};
use crate::errors::TripflowError;
use crate::utils::{now_utc, RunId, Timestamp};
use serde::{Deserialize, Serialize};

/// One end-to-end execution for a single trip request.
///
/// The controller owns the run while it executes. Callers see clones taken
/// through [`RunHandle::snapshot`](crate::pipeline::RunHandle::snapshot).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    /// Run identifier.
    pub id: RunId,
    /// The request being planned.
    pub request: TripRequest,
    /// One result per executed stage, in stage order.
    pub results: Vec<StageResult>,
    /// Lifecycle status.
    pub status: RunStatus,
    /// When the run was created.
    pub created_at: Timestamp,
    /// When the first stage started.
    pub started_at: Option<Timestamp>,
    /// When the run reached a terminal status.
    pub finished_at: Option<Timestamp>,
    /// Why the run failed or was cancelled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    /// Store key of the report, set only when completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_key: Option<String>,
}

impl PipelineRun {
    /// Creates a pending run.
    #[must_use]
    pub fn new(id: RunId, request: TripRequest) -> Self {
        Self {
            id,
            request,
            results: Vec::new(),
            status: RunStatus::Pending,
            created_at: now_utc(),
            started_at: None,
            finished_at: None,
            failure_reason: None,
            report_key: None,
        }
    }

    /// Moves the run to a new status, stamping start and finish times.
    ///
    /// # Errors
    ///
    /// Returns [`TripflowError::InvalidTransition`] if the move is not forward.
    pub fn transition(&mut self, to: RunStatus) -> Result<(), TripflowError> {
        if !self.status.can_transition_to(to) {
            return Err(TripflowError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        let now = now_utc();
        if to == RunStatus::Running {
            self.started_at = Some(now);
        }
        if to.is_terminal() {
            self.finished_at = Some(now);
        }
        self.status = to;
        Ok(())
    }

    /// Appends the final result of a stage.
    pub(crate) fn push_result(&mut self, result: StageResult) {
        self.results.push(result);
    }

    /// The context built from succeeded stages, in stage order.
    #[must_use]
    pub fn context(&self) -> Context {
        let mut ctx = Context::new();
        for result in self.results.iter().filter(|r| r.is_success()) {
            ctx.append(result.stage.clone(), result.output.clone());
        }
        ctx
    }

    /// Returns the result for a stage.
    #[must_use]
    pub fn result(&self, stage: &str) -> Option<&StageResult> {
        self.results.iter().find(|r| r.stage == stage)
    }

    /// Total run time once finished.
    #[must_use]
    pub fn elapsed_ms(&self) -> Option<i64> {
        let start = self.started_at?;
        let end = self.finished_at?;
        Some((end - start).num_milliseconds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StageStatus;
    use chrono::NaiveDate;

    fn run() -> PipelineRun {
        let d = |day| NaiveDate::from_ymd_opt(2024, 6, day).unwrap();
        PipelineRun::new(RunId::new(), TripRequest::new("New York", "Barcelona", d(15), d(22)))
    }

    #[test]
    fn test_forward_transitions_stamp_times() {
        let mut run = run();
        assert_eq!(run.status, RunStatus::Pending);

        run.transition(RunStatus::Running).unwrap();
        assert!(run.started_at.is_some());
        assert!(run.finished_at.is_none());

        run.transition(RunStatus::Completed).unwrap();
        assert!(run.finished_at.is_some());
        assert!(run.elapsed_ms().is_some());
    }

    #[test]
    fn test_terminal_status_is_final() {
        let mut run = run();
        run.transition(RunStatus::Running).unwrap();
        run.transition(RunStatus::Cancelled).unwrap();

        for to in [RunStatus::Running, RunStatus::Completed, RunStatus::Failed, RunStatus::Pending] {
            let err = run.transition(to).unwrap_err();
            assert!(matches!(err, TripflowError::InvalidTransition { .. }));
        }
        assert_eq!(run.status, RunStatus::Cancelled);
    }

    #[test]
    fn test_context_only_holds_successes() {
        let mut run = run();
        run.push_result(StageResult::succeeded("destination_analysis", "analysis"));
        run.push_result(StageResult::failed("local_expertise", StageStatus::FailedFatal, "bad"));

        let ctx = run.context();
        assert_eq!(ctx.len(), 1);
        assert_eq!(ctx.get("destination_analysis"), Some("analysis"));
        assert!(run.result("local_expertise").is_some());
    }
}
