//! The reasoning stage shared by every role.

use super::{Stage, StageInput, StageRole};
use crate::clients::{Prompt, ReasoningClient, SearchHit};
use crate::core::{ProgressEventKind, StageResult, ToolCallRecord, TripRequest};
use crate::errors::ClientError;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::fmt::Write as _;
use tracing::{debug, info_span, Instrument};

/// Default number of search queries in flight per stage.
pub const DEFAULT_FAN_OUT: usize = 3;

/// Default cap on search queries per stage.
pub const DEFAULT_MAX_QUERIES: usize = 4;

/// A stage that grounds a role's prompt in search results and asks the
/// reasoning backend for the role's output.
///
/// Each attempt runs the role's queries with bounded concurrency, joins them,
/// then calls the reasoning client exactly once. Client errors and malformed
/// output become failed results classified by [`ClientError::stage_status`].
#[derive(Debug, Clone)]
pub struct StageAgent {
    role: StageRole,
    reasoning: ReasoningClient,
    fan_out: usize,
    max_queries: usize,
}

impl StageAgent {
    /// Creates an agent for a role.
    #[must_use]
    pub fn new(role: StageRole, reasoning: ReasoningClient) -> Self {
        Self {
            role,
            reasoning,
            fan_out: DEFAULT_FAN_OUT,
            max_queries: DEFAULT_MAX_QUERIES,
        }
    }

    /// Creates the three agents in pipeline order.
    #[must_use]
    pub fn travel_planner(reasoning: &ReasoningClient) -> Vec<Self> {
        StageRole::ALL
            .into_iter()
            .map(|role| Self::new(role, reasoning.clone()))
            .collect()
    }

    /// Sets how many queries may run at once.
    #[must_use]
    pub fn with_fan_out(mut self, fan_out: usize) -> Self {
        self.fan_out = fan_out.max(1);
        self
    }

    /// Sets the per-stage query cap.
    #[must_use]
    pub fn with_max_queries(mut self, max_queries: usize) -> Self {
        self.max_queries = max_queries;
        self
    }

    /// The agent's role.
    #[must_use]
    pub fn role(&self) -> StageRole {
        self.role
    }

    async fn gather(&self, input: &StageInput<'_>) -> (Vec<ToolCallRecord>, String, Option<ClientError>) {
        let stage = self.role.stage_name();
        let queries: Vec<String> = self
            .role
            .queries(input.request)
            .into_iter()
            .take(self.max_queries)
            .collect();

        let outcomes: Vec<(String, Result<(Vec<SearchHit>, bool), ClientError>)> = stream::iter(queries)
            .map(|query| async move {
                input
                    .progress
                    .stage_event(stage, ProgressEventKind::ToolCallStarted, Some(query.clone()));
                let outcome = input.search.search(&query).await;
                let message = match &outcome {
                    Ok((hits, cached)) => format!(
                        "{query}: {} results{}",
                        hits.len(),
                        if *cached { " (cached)" } else { "" }
                    ),
                    Err(e) => format!("{query}: {e}"),
                };
                input
                    .progress
                    .stage_event(stage, ProgressEventKind::ToolCallFinished, Some(message));
                (query, outcome)
            })
            .buffered(self.fan_out)
            .collect()
            .await;

        let mut records = Vec::with_capacity(outcomes.len());
        let mut grounding = String::new();
        let mut first_error = None;

        for (query, outcome) in outcomes {
            match outcome {
                Ok((hits, cached)) => {
                    records.push(ToolCallRecord::ok(&query, summarize(&hits), hits.len()).with_cached(cached));
                    let _ = writeln!(grounding, "Query: {query}");
                    for hit in &hits {
                        let _ = writeln!(grounding, "- {}: {} ({})", hit.title, hit.snippet, hit.url);
                    }
                    grounding.push('\n');
                }
                Err(e) => {
                    records.push(ToolCallRecord::failed(&query, e.to_string()));
                    first_error.get_or_insert(e);
                }
            }
        }

        (records, grounding, first_error)
    }

    fn prompt(&self, input: &StageInput<'_>, grounding: String) -> Prompt {
        let mut prompt = Prompt::new(request_header(input.request));
        for entry in input.context.iter() {
            prompt = prompt.with_prior(&entry.stage, &entry.output);
        }
        prompt.with_grounding(grounding).with_task(self.role.task(input.request))
    }
}

#[async_trait]
impl Stage for StageAgent {
    fn name(&self) -> &str {
        self.role.stage_name()
    }

    async fn execute(&self, input: StageInput<'_>) -> StageResult {
        let stage = self.role.stage_name();
        let span = info_span!("stage_agent", role = %self.role, attempt = input.attempt);

        async {
            let (tool_calls, grounding, search_error) = self.gather(&input).await;
            if let Some(err) = search_error {
                return StageResult::failed(stage, err.stage_status(), err.to_string())
                    .with_tool_calls(tool_calls)
                    .with_retry_after(err.reset_after());
            }

            let prompt = self.prompt(&input, grounding);
            let persona = self.role.persona().system_message();
            let output = match self.reasoning.complete(&prompt, &persona, self.role.params()).await {
                Ok(output) => output,
                Err(err) => {
                    return StageResult::failed(stage, err.stage_status(), err.to_string())
                        .with_tool_calls(tool_calls)
                        .with_retry_after(err.reset_after());
                }
            };

            if let Err(err) = self.role.validate(&output, input.request) {
                debug!(error = %err, "Stage output failed shape check");
                return StageResult::failed(stage, err.stage_status(), err.to_string()).with_tool_calls(tool_calls);
            }

            StageResult::succeeded(stage, output).with_tool_calls(tool_calls)
        }
        .instrument(span)
        .await
    }
}

fn summarize(hits: &[SearchHit]) -> String {
    match hits {
        [] => "no results".to_string(),
        [first, ..] if hits.len() == 1 => first.title.clone(),
        [first, ..] => format!("{} and {} more", first.title, hits.len() - 1),
    }
}

/// The request block placed at the top of every prompt.
#[must_use]
pub fn request_header(request: &TripRequest) -> String {
    let mut out = String::from("## Trip request\n");
    let _ = writeln!(out, "- Origin: {}", request.origin.trim());
    let _ = writeln!(out, "- Destination: {}", request.destination.trim());
    let _ = writeln!(
        out,
        "- Dates: {} to {} ({} days)",
        request.start_date,
        request.end_date,
        request.duration_days()
    );
    let _ = writeln!(out, "- Travellers: {}", request.travelers);
    let _ = writeln!(out, "- Budget: {}", request.budget);
    let _ = writeln!(out, "- Style: {}", request.style);
    let _ = writeln!(out, "- Interests: {}", request.interests().join(", "));

    let prefs = &request.preferences;
    if !prefs.dietary_restrictions.is_empty() {
        let _ = writeln!(out, "- Dietary restrictions: {}", prefs.dietary_restrictions.join(", "));
    }
    if let Some(mobility) = prefs.mobility_needs.as_deref().filter(|m| !m.trim().is_empty()) {
        let _ = writeln!(out, "- Mobility needs: {mobility}");
    }
    if !prefs.must_see.is_empty() {
        let _ = writeln!(out, "- Must see: {}", prefs.must_see.join(", "));
    }
    if !prefs.avoid.is_empty() {
        let _ = writeln!(out, "- Avoid: {}", prefs.avoid.join(", "));
    }
    out
}
