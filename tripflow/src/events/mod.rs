//! Progress event delivery.
//!
//! This module provides:
//! - The [`ProgressSink`] trait callers implement to receive events
//! - [`ProgressChannel`], a broadcast channel with drop-oldest backpressure
//! - [`ProgressEmitter`], the numbered single writer for one run

mod channel;
mod emitter;
mod sink;

pub use channel::{ProgressChannel, ProgressMetrics, ProgressStream, DEFAULT_CHANNEL_CAPACITY};
pub use emitter::ProgressEmitter;
pub use sink::{CollectingProgressSink, LoggingProgressSink, NoOpProgressSink, ProgressSink};
