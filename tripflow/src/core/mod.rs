//! Core domain model types for tripflow.
//!
//! This module contains the fundamental types shared by every component:
//! - The trip request and its enums
//! - Stage and run status enums
//! - Stage results, the accumulated context and the run record
//! - Progress events
//! - Markdown section parsing used by validators and the assembler

mod context;
mod event;
mod request;
mod result;
mod run;
pub mod sections;
mod status;

pub use context::{Context, ContextEntry};
pub use event::{ProgressEvent, ProgressEventKind};
pub use request::{BudgetTier, Preferences, Travelers, TravelStyle, TripRequest};
pub use result::{StageResult, ToolCallRecord};
pub use run::PipelineRun;
pub use sections::Section;
pub use status::{RunStatus, StageStatus};
