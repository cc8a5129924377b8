//! Broadcast progress channel with drop-oldest backpressure.

use super::ProgressSink;
use crate::core::ProgressEvent;
use futures::Stream;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::warn;

/// Default number of events buffered per subscriber.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Counters for channel backpressure.
#[derive(Debug, Default)]
pub struct ProgressMetrics {
    emitted: AtomicU64,
    dropped: AtomicU64,
}

impl ProgressMetrics {
    /// Records a sent event.
    pub fn record_emit(&self) {
        self.emitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Records events a subscriber lost to overflow.
    pub fn record_drop(&self, count: u64) {
        self.dropped.fetch_add(count, Ordering::Relaxed);
    }

    /// Returns the number of events sent.
    #[must_use]
    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }

    /// Returns the number of events lost by subscribers.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Single-writer, multi-reader progress channel.
///
/// Sending never waits. A subscriber whose buffer is full loses its oldest
/// events and learns how many on its next read.
#[derive(Debug, Clone)]
pub struct ProgressChannel {
    tx: broadcast::Sender<ProgressEvent>,
    metrics: Arc<ProgressMetrics>,
}

impl Default for ProgressChannel {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl ProgressChannel {
    /// Creates a channel buffering `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            metrics: Arc::new(ProgressMetrics::default()),
        }
    }

    /// Opens a new subscription that sees events sent from now on.
    #[must_use]
    pub fn subscribe(&self) -> ProgressStream {
        ProgressStream {
            rx: self.tx.subscribe(),
            metrics: Arc::clone(&self.metrics),
            finished: false,
        }
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Returns the metrics.
    #[must_use]
    pub fn metrics(&self) -> &ProgressMetrics {
        &self.metrics
    }
}

impl ProgressSink for ProgressChannel {
    fn emit(&self, event: &ProgressEvent) {
        // An error only means nobody is subscribed.
        if self.tx.send(event.clone()).is_ok() {
            self.metrics.record_emit();
        }
    }
}

/// A subscription to a [`ProgressChannel`].
///
/// Ends after the run's terminal event or when the channel closes.
#[derive(Debug)]
pub struct ProgressStream {
    rx: broadcast::Receiver<ProgressEvent>,
    metrics: Arc<ProgressMetrics>,
    finished: bool,
}

impl ProgressStream {
    /// Waits for the next event.
    pub async fn next(&mut self) -> Option<ProgressEvent> {
        if self.finished {
            return None;
        }
        loop {
            match self.rx.recv().await {
                Ok(event) => {
                    if event.kind.is_terminal() {
                        self.finished = true;
                    }
                    return Some(event);
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    self.metrics.record_drop(missed);
                    warn!(missed, "Progress subscriber lagged, oldest events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    self.finished = true;
                    return None;
                }
            }
        }
    }

    /// Drains events until the stream ends.
    pub async fn collect_all(mut self) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.next().await {
            events.push(event);
        }
        events
    }

    /// Converts into a [`futures::Stream`].
    pub fn into_stream(self) -> impl Stream<Item = ProgressEvent> + Send {
        futures::stream::unfold(self, |mut s| async move {
            let event = s.next().await?;
            Some((event, s))
        })
    }
}
