//! Test support for tripflow pipelines.
//!
//! This module provides:
//! - Scripted search and reasoning backends
//! - A recording stage with scripted failures
//! - Barcelona scenario fixtures
//! - Assertions over runs and progress events

mod assertions;
pub mod fixtures;
mod mocks;

pub use assertions::{assert_events_sequenced, assert_kinds_in_order, assert_run_status, assert_stage_order};
pub use mocks::{RecordedAttempt, RecordingStage, ScriptedReasoning, ScriptedSearch};
