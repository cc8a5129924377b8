//! Pipeline execution.
//!
//! This module provides:
//! - The sequential [`PipelineController`]
//! - [`RunHandle`] for runs driven on their own task
//! - The stage [`RetryPolicy`] with backoff and jitter

mod controller;
mod handle;
mod retry;

pub use controller::PipelineController;
pub use handle::RunHandle;
pub use retry::{BackoffStrategy, JitterStrategy, RetryPolicy};
