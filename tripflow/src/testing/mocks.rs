//! Scripted backends and stages for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::fixtures;
use crate::cancellation::CancellationToken;
use crate::clients::{CompletionRequest, ReasoningBackend, SearchBackend, SearchHit};
use crate::core::{StageResult, StageStatus};
use crate::errors::ClientError;
use crate::stages::{Stage, StageInput, StageRole};

/// A search backend that returns canned hits unless told to fail.
#[derive(Debug, Default)]
pub struct ScriptedSearch {
    failures: Mutex<VecDeque<ClientError>>,
    always: Option<ClientError>,
    queries: Mutex<Vec<String>>,
    hits_per_query: usize,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ScriptedSearch {
    /// Creates a backend returning three hits per query.
    #[must_use]
    pub fn new() -> Self {
        Self {
            hits_per_query: 3,
            ..Self::default()
        }
    }

    /// Fails the next call with `err`. Calls queue in order.
    #[must_use]
    pub fn fail_next(self, err: ClientError) -> Self {
        self.failures.lock().push_back(err);
        self
    }

    /// Fails every call with `err`.
    #[must_use]
    pub fn always_fail(mut self, err: ClientError) -> Self {
        self.always = Some(err);
        self
    }

    /// Sets how many hits each successful query returns.
    #[must_use]
    pub fn with_hits(mut self, hits: usize) -> Self {
        self.hits_per_query = hits;
        self
    }

    /// Holds every call for `delay` before answering.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of backend calls made.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.queries.lock().len()
    }

    /// Most calls that were in progress at the same time.
    #[must_use]
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Queries received, in call order.
    #[must_use]
    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }
}

#[async_trait]
impl SearchBackend for ScriptedSearch {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, ClientError> {
        self.queries.lock().push(query.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(err) = self.failures.lock().pop_front() {
            return Err(err);
        }
        if let Some(err) = &self.always {
            return Err(err.clone());
        }
        Ok((1..=self.hits_per_query.min(max_results))
            .map(|i| {
                SearchHit::new(
                    format!("{query} result {i}"),
                    format!("Snippet {i} about {query}"),
                    format!("https://example.com/{i}"),
                )
            })
            .collect())
    }
}

type Reply = Result<String, ClientError>;

/// A reasoning backend that replays scripted replies.
///
/// Role-specific replies win, then the queue, then (for
/// [`ScriptedReasoning::travel_planner`]) the fixture output of the role named
/// in the system message. The last queued reply repeats once the queue is
/// down to one entry.
#[derive(Debug, Default)]
pub struct ScriptedReasoning {
    queue: Mutex<VecDeque<Reply>>,
    per_role: Mutex<HashMap<StageRole, VecDeque<Reply>>>,
    route_by_role: bool,
    delay: Option<Duration>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedReasoning {
    /// Creates a backend with no replies.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend that answers each role with its fixture output.
    #[must_use]
    pub fn travel_planner() -> Self {
        Self {
            route_by_role: true,
            ..Self::default()
        }
    }

    /// Queues a reply.
    #[must_use]
    pub fn respond(self, text: impl Into<String>) -> Self {
        self.queue.lock().push_back(Ok(text.into()));
        self
    }

    /// Queues an error.
    #[must_use]
    pub fn fail(self, err: ClientError) -> Self {
        self.queue.lock().push_back(Err(err));
        self
    }

    /// Queues a reply for one role only.
    #[must_use]
    pub fn respond_as(self, role: StageRole, text: impl Into<String>) -> Self {
        self.per_role.lock().entry(role).or_default().push_back(Ok(text.into()));
        self
    }

    /// Queues an error for one role only.
    #[must_use]
    pub fn fail_as(self, role: StageRole, err: ClientError) -> Self {
        self.per_role.lock().entry(role).or_default().push_back(Err(err));
        self
    }

    /// Sleeps before every reply.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Requests received, in call order.
    #[must_use]
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }

    /// Number of requests received from a role.
    #[must_use]
    pub fn calls_for(&self, role: StageRole) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| role_of(&r.system) == Some(role))
            .count()
    }

    fn next_reply(&self, system: &str) -> Reply {
        let role = role_of(system);
        if let Some(role) = role {
            if let Some(queue) = self.per_role.lock().get_mut(&role) {
                if let Some(reply) = take(queue) {
                    return reply;
                }
            }
        }
        if let Some(reply) = take(&mut self.queue.lock()) {
            return reply;
        }
        match role {
            Some(role) if self.route_by_role => Ok(fixtures::output_for(role)),
            _ => Err(ClientError::MalformedOutput("no scripted reply".to_string())),
        }
    }
}

/// Pops the front reply, repeating the last one.
fn take(queue: &mut VecDeque<Reply>) -> Option<Reply> {
    if queue.len() > 1 {
        queue.pop_front()
    } else {
        queue.front().cloned()
    }
}

fn role_of(system: &str) -> Option<StageRole> {
    StageRole::ALL
        .into_iter()
        .find(|role| system.contains(role.persona().role))
}

#[async_trait]
impl ReasoningBackend for ScriptedReasoning {
    fn model(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, ClientError> {
        self.requests.lock().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.next_reply(&request.system)
    }
}

/// What a [`RecordingStage`] saw on one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedAttempt {
    /// Attempt number.
    pub attempt: u32,
    /// Stage names present in the context.
    pub context: Vec<String>,
}

/// A stage that records its inputs and fails a set number of times first.
#[derive(Debug)]
pub struct RecordingStage {
    name: String,
    output: String,
    failures: Mutex<VecDeque<(StageStatus, Option<Duration>)>>,
    delay: Option<Duration>,
    cancels: Option<CancellationToken>,
    attempts: Mutex<Vec<RecordedAttempt>>,
}

impl RecordingStage {
    /// Creates a stage that succeeds with `## <name>` output.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            output: format!("## {name}\nDone."),
            name,
            failures: Mutex::new(VecDeque::new()),
            delay: None,
            cancels: None,
            attempts: Mutex::new(Vec::new()),
        }
    }

    /// Fails the next `times` attempts with `status`.
    #[must_use]
    pub fn fail_times(self, times: usize, status: StageStatus) -> Self {
        self.failures
            .lock()
            .extend(std::iter::repeat((status, None)).take(times));
        self
    }

    /// Fails the next attempt as rate limited with a reset hint.
    #[must_use]
    pub fn rate_limited_once(self, reset_after: Duration) -> Self {
        self.failures
            .lock()
            .push_back((StageStatus::FailedRetryable, Some(reset_after)));
        self
    }

    /// Sleeps before finishing each attempt.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Cancels `token` while executing.
    #[must_use]
    pub fn cancelling(mut self, token: CancellationToken) -> Self {
        self.cancels = Some(token);
        self
    }

    /// Attempts seen so far.
    #[must_use]
    pub fn attempts(&self) -> Vec<RecordedAttempt> {
        self.attempts.lock().clone()
    }

    /// Number of attempts.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.attempts.lock().len()
    }
}

#[async_trait]
impl Stage for RecordingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, input: StageInput<'_>) -> StageResult {
        self.attempts.lock().push(RecordedAttempt {
            attempt: input.attempt,
            context: input.context.stages().iter().map(ToString::to_string).collect(),
        });
        if let Some(token) = &self.cancels {
            token.cancel(format!("cancelled by {}", self.name));
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let failure = self.failures.lock().pop_front();
        match failure {
            Some((status, hint)) => StageResult::failed(&self.name, status, format!("scripted {status} failure"))
                .with_retry_after(hint),
            None => StageResult::succeeded(&self.name, &self.output),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::GenerationParams;

    fn request(system: &str) -> CompletionRequest {
        CompletionRequest {
            system: system.to_string(),
            prompt: "p".to_string(),
            params: GenerationParams::default(),
        }
    }

    #[tokio::test]
    async fn test_scripted_search_failures_then_hits() {
        let search = ScriptedSearch::new().fail_next(ClientError::transient("s", "x"));
        assert!(search.search("q", 5).await.is_err());
        assert_eq!(search.search("q", 2).await.unwrap().len(), 2);
        assert_eq!(search.calls(), 2);
    }

    #[tokio::test]
    async fn test_travel_planner_routes_by_persona() {
        let backend = ScriptedReasoning::travel_planner()
            .respond_as(StageRole::LocalExpert, "first")
            .respond_as(StageRole::LocalExpert, "second");

        let local = StageRole::LocalExpert.persona().system_message();
        assert_eq!(backend.complete(&request(&local)).await.unwrap(), "first");
        assert_eq!(backend.complete(&request(&local)).await.unwrap(), "second");
        assert_eq!(backend.complete(&request(&local)).await.unwrap(), "second");

        let analyst = StageRole::DestinationAnalyst.persona().system_message();
        let out = backend.complete(&request(&analyst)).await.unwrap();
        assert!(out.contains("## Weather"));
        assert_eq!(backend.calls_for(StageRole::LocalExpert), 3);
    }

    #[tokio::test]
    async fn test_unscripted_reply_is_malformed() {
        let backend = ScriptedReasoning::new();
        let err = backend.complete(&request("anyone")).await.unwrap_err();
        assert!(matches!(err, ClientError::MalformedOutput(_)));
    }
}
