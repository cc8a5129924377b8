//! Per-run progress emitter.

use super::ProgressSink;
use crate::core::{ProgressEvent, ProgressEventKind};
use crate::utils::RunId;
use parking_lot::Mutex;
use std::sync::Arc;

/// The single writer of a run's progress events.
///
/// Numbers events and fans them out to every attached sink. The sequence lock
/// is held across dispatch so sinks observe events in sequence order.
pub struct ProgressEmitter {
    run_id: RunId,
    sinks: Vec<Arc<dyn ProgressSink>>,
    next_seq: Mutex<u64>,
}

impl ProgressEmitter {
    /// Creates an emitter for a run.
    #[must_use]
    pub fn new(run_id: RunId, sinks: Vec<Arc<dyn ProgressSink>>) -> Self {
        Self {
            run_id,
            sinks,
            next_seq: Mutex::new(0),
        }
    }

    /// The run this emitter belongs to.
    #[must_use]
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Emits a run-level event.
    pub fn run_event(&self, kind: ProgressEventKind, message: Option<String>) {
        let mut event = ProgressEvent::run(self.run_id, kind);
        event.message = message;
        self.dispatch(event);
    }

    /// Emits a stage-level event.
    pub fn stage_event(&self, stage: &str, kind: ProgressEventKind, message: Option<String>) {
        let mut event = ProgressEvent::stage(self.run_id, stage, kind);
        event.message = message;
        self.dispatch(event);
    }

    /// Number of events emitted so far.
    #[must_use]
    pub fn emitted(&self) -> u64 {
        *self.next_seq.lock()
    }

    fn dispatch(&self, event: ProgressEvent) {
        let mut seq = self.next_seq.lock();
        let event = event.with_seq(*seq);
        *seq += 1;
        for sink in &self.sinks {
            sink.emit(&event);
        }
    }
}

impl std::fmt::Debug for ProgressEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressEmitter")
            .field("run_id", &self.run_id)
            .field("sinks", &self.sinks.len())
            .field("emitted", &self.emitted())
            .finish()
    }
}
