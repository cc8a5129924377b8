//! # Tripflow
//!
//! Orchestration core of a staged trip planner.
//!
//! A trip request flows through three reasoning stages in a fixed order:
//!
//! - **Destination analysis**: weather, costs, attractions and safety
//! - **Local insights**: insider tips, etiquette and food
//! - **Trip concierge**: day-by-day itinerary, budget and packing list
//!
//! Each stage grounds its prompt in web search results and receives the text
//! produced by every stage before it. Retryable failures are re-run with
//! backoff, runs can be cancelled cooperatively, progress is streamed live,
//! and a completed run is assembled into one markdown report that is stored
//! exactly once.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tripflow::prelude::*;
//!
//! let config = TripflowConfig::from_env()?;
//! let controller = PipelineController::from_config(&config)?;
//!
//! let request = TripRequest::new("New York", "Barcelona", start, end)
//!     .with_style(TravelStyle::Cultural);
//! let run = controller.run(request, LoggingProgressSink::default()).await?;
//! println!("{}", controller.report_for(run.id).await?);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod clients;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod report;
pub mod stages;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::clients::{ReasoningClient, SearchClient};
    pub use crate::config::TripflowConfig;
    pub use crate::core::{
        BudgetTier, Context, PipelineRun, Preferences, ProgressEvent, ProgressEventKind,
        RunStatus, StageResult, StageStatus, TravelStyle, Travelers, TripRequest,
    };
    pub use crate::errors::{ClientError, StorageError, TripflowError, ValidationError};
    pub use crate::events::{
        CollectingProgressSink, LoggingProgressSink, NoOpProgressSink, ProgressSink,
        ProgressStream,
    };
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::pipeline::{PipelineController, RetryPolicy, RunHandle};
    pub use crate::report::{FileReportStore, InMemoryReportStore, Report, ReportAssembler, ReportStore};
    pub use crate::stages::{Stage, StageAgent, StageRole};
    pub use crate::utils::{RunId, Timestamp};
}
