//! Assertions for finished runs and event streams.

use crate::core::{PipelineRun, ProgressEvent, ProgressEventKind, RunStatus};

/// Asserts the run ended in `expected`.
pub fn assert_run_status(run: &PipelineRun, expected: RunStatus) {
    assert_eq!(
        run.status, expected,
        "Expected run status {expected}, got {} (reason: {:?})",
        run.status, run.failure_reason
    );
}

/// Asserts the run's results are exactly `stages`, in order.
pub fn assert_stage_order(run: &PipelineRun, stages: &[&str]) {
    let actual: Vec<&str> = run.results.iter().map(|r| r.stage.as_str()).collect();
    assert_eq!(actual, stages, "Unexpected stage result order");
}

/// Asserts sequence numbers are gapless and increasing from zero.
pub fn assert_events_sequenced(events: &[ProgressEvent]) {
    for (i, event) in events.iter().enumerate() {
        assert_eq!(event.seq, i as u64, "Event {i} has seq {} ({event})", event.seq);
    }
}

/// Asserts `kinds` appear in `events` in this relative order.
pub fn assert_kinds_in_order(events: &[ProgressEvent], kinds: &[ProgressEventKind]) {
    let mut remaining = kinds.iter().peekable();
    for event in events {
        if remaining.peek() == Some(&&event.kind) {
            remaining.next();
        }
    }
    let missing: Vec<_> = remaining.collect();
    assert!(
        missing.is_empty(),
        "Event kinds {missing:?} not found in order among {:?}",
        events.iter().map(|e| e.kind).collect::<Vec<_>>()
    );
}
