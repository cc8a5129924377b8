//! Progress sink trait and implementations.

use crate::core::{ProgressEvent, ProgressEventKind};
use parking_lot::RwLock;
use tracing::{debug, info, Level};

/// Receiver of progress events.
///
/// `emit` is called on the pipeline's worker task and must never block or
/// fail. Sinks that forward elsewhere drop events rather than wait.
pub trait ProgressSink: Send + Sync {
    /// Delivers one event.
    fn emit(&self, event: &ProgressEvent);
}

/// A sink that discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpProgressSink;

impl ProgressSink for NoOpProgressSink {
    fn emit(&self, _event: &ProgressEvent) {}
}

/// A sink that logs events using the tracing framework.
#[derive(Debug, Clone)]
pub struct LoggingProgressSink {
    level: Level,
}

impl Default for LoggingProgressSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingProgressSink {
    /// Creates a logging sink at the given level. Levels other than DEBUG log at INFO.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }
}

impl ProgressSink for LoggingProgressSink {
    fn emit(&self, event: &ProgressEvent) {
        let stage = event.stage.as_deref().unwrap_or("-");
        let message = event.message.as_deref().unwrap_or("");
        if self.level == Level::DEBUG {
            debug!(
                run_id = %event.run_id,
                seq = event.seq,
                stage,
                kind = %event.kind,
                "{message}"
            );
        } else {
            info!(
                run_id = %event.run_id,
                seq = event.seq,
                stage,
                kind = %event.kind,
                "{message}"
            );
        }
    }
}

/// A sink that keeps every event, for tests and callers that poll.
#[derive(Debug, Default)]
pub struct CollectingProgressSink {
    events: RwLock<Vec<ProgressEvent>>,
}

impl CollectingProgressSink {
    /// Creates a new collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.read().clone()
    }

    /// Returns just the kinds, in order.
    #[must_use]
    pub fn kinds(&self) -> Vec<ProgressEventKind> {
        self.events.read().iter().map(|e| e.kind).collect()
    }

    /// Returns events of one kind.
    #[must_use]
    pub fn of_kind(&self, kind: ProgressEventKind) -> Vec<ProgressEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

impl ProgressSink for CollectingProgressSink {
    fn emit(&self, event: &ProgressEvent) {
        self.events.write().push(event.clone());
    }
}

impl<S: ProgressSink + ?Sized> ProgressSink for std::sync::Arc<S> {
    fn emit(&self, event: &ProgressEvent) {
        (**self).emit(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::RunId;

    #[test]
    fn test_noop_and_logging_sinks() {
        let event = ProgressEvent::run(RunId::new(), ProgressEventKind::RunStarted);
        NoOpProgressSink.emit(&event);
        LoggingProgressSink::default().emit(&event);
        LoggingProgressSink::debug().emit(&event.clone().with_message("debug"));
    }

    #[test]
    fn test_collecting_sink() {
        let sink = CollectingProgressSink::new();
        assert!(sink.is_empty());

        let id = RunId::new();
        sink.emit(&ProgressEvent::run(id, ProgressEventKind::RunStarted));
        sink.emit(&ProgressEvent::stage(id, "a", ProgressEventKind::Started));
        sink.emit(&ProgressEvent::stage(id, "a", ProgressEventKind::Succeeded));

        assert_eq!(sink.len(), 3);
        assert_eq!(
            sink.kinds(),
            vec![
                ProgressEventKind::RunStarted,
                ProgressEventKind::Started,
                ProgressEventKind::Succeeded
            ]
        );
        assert_eq!(sink.of_kind(ProgressEventKind::Started).len(), 1);
    }
}
