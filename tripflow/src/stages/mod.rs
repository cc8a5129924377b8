//! Stage trait and implementations.
//!
//! A stage is a pure function of the trip request and the context built by
//! earlier stages. It reports failure through the returned
//! [`StageResult`] status and leaves retry decisions to the controller.

mod agent;
mod roles;

pub use agent::{StageAgent, DEFAULT_FAN_OUT, DEFAULT_MAX_QUERIES};
pub use roles::{count_days, Persona, StageRole};

use crate::clients::SearchSession;
use crate::core::{Context, StageResult, TripRequest};
use crate::events::ProgressEmitter;
use async_trait::async_trait;
use std::fmt::Debug;

/// Everything a stage attempt can see.
#[derive(Debug, Clone, Copy)]
pub struct StageInput<'a> {
    /// The trip being planned.
    pub request: &'a TripRequest,
    /// Outputs of the stages before this one.
    pub context: &'a Context,
    /// Search access scoped to the run.
    pub search: &'a SearchSession,
    /// Progress emitter for tool call events.
    pub progress: &'a ProgressEmitter,
    /// Attempt number, starting at 1.
    pub attempt: u32,
}

/// Trait for pipeline stages.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Returns the name of the stage.
    fn name(&self) -> &str;

    /// Executes one attempt of the stage.
    async fn execute(&self, input: StageInput<'_>) -> StageResult;
}

/// A stage backed by a plain function, for tests and simple pipelines.
pub struct FnStage<F>
where
    F: Fn(&TripRequest, &Context, u32) -> StageResult + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnStage<F>
where
    F: Fn(&TripRequest, &Context, u32) -> StageResult + Send + Sync,
{
    /// Creates a new function-based stage.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnStage<F>
where
    F: Fn(&TripRequest, &Context, u32) -> StageResult + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F> Stage for FnStage<F>
where
    F: Fn(&TripRequest, &Context, u32) -> StageResult + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, input: StageInput<'_>) -> StageResult {
        (self.func)(input.request, input.context, input.attempt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{RateLimitGate, SearchClient};
    use crate::core::StageStatus;
    use crate::testing::{fixtures, ScriptedSearch};
    use crate::utils::RunId;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_fn_stage_sees_context_and_attempt() {
        let stage = FnStage::new("echo", |req: &TripRequest, ctx: &Context, attempt| {
            if attempt < 2 {
                return StageResult::failed("echo", StageStatus::FailedRetryable, "not yet");
            }
            StageResult::succeeded("echo", format!("{} after {}", req.destination, ctx.len()))
        });
        assert_eq!(stage.name(), "echo");

        let request = fixtures::barcelona_request();
        let mut context = Context::new();
        context.append("prior", "text");
        let search = SearchClient::new(Arc::new(ScriptedSearch::new()), Arc::new(RateLimitGate::default())).session();
        let progress = ProgressEmitter::new(RunId::new(), Vec::new());

        let mut input = StageInput {
            request: &request,
            context: &context,
            search: &search,
            progress: &progress,
            attempt: 1,
        };
        assert!(!stage.execute(input).await.is_success());

        input.attempt = 2;
        let result = stage.execute(input).await;
        assert_eq!(result.output, "Barcelona after 1");
    }
}
