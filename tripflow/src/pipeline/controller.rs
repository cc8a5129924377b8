//! Sequential stage execution with retry, cancellation and report publishing.

use super::{RetryPolicy, RunHandle};
use crate::cancellation::CancellationToken;
use crate::clients::{ReasoningClient, SearchClient, SearchSession};
use crate::core::{PipelineRun, ProgressEventKind, RunStatus, StageResult, TripRequest};
use crate::errors::{StorageError, TripflowError};
use crate::events::{ProgressChannel, ProgressEmitter, ProgressSink, DEFAULT_CHANNEL_CAPACITY};
use crate::report::ReportAssembler;
use crate::stages::{Stage, StageAgent, StageInput};
use crate::utils::RunId;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// How one stage ended.
enum StageOutcome {
    Succeeded(StageResult),
    Failed(StageResult),
    Cancelled,
}

/// Drives the configured stages in order for each trip request.
///
/// Stages run strictly one after another. A stage that fails retryably is
/// re-run with backoff until the retry policy is exhausted. The cancellation
/// token is checked at every stage boundary and races every stage attempt and
/// retry sleep. When all stages succeed the report is written exactly once
/// and only then is the run marked completed.
///
/// The controller is cheap to clone and can drive any number of runs
/// concurrently; each run gets its own search cache and progress channel.
#[derive(Clone)]
pub struct PipelineController {
    stages: Vec<Arc<dyn Stage>>,
    search: SearchClient,
    assembler: ReportAssembler,
    retry: RetryPolicy,
    channel_capacity: usize,
    reports: Arc<DashMap<RunId, String>>,
}

impl PipelineController {
    /// Creates a controller over `stages`, in execution order.
    #[must_use]
    pub fn new(stages: Vec<Arc<dyn Stage>>, search: SearchClient, assembler: ReportAssembler) -> Self {
        Self {
            stages,
            search,
            assembler,
            retry: RetryPolicy::default(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            reports: Arc::new(DashMap::new()),
        }
    }

    /// Creates the three-stage travel planner.
    #[must_use]
    pub fn travel_planner(reasoning: &ReasoningClient, search: SearchClient, assembler: ReportAssembler) -> Self {
        let stages = StageAgent::travel_planner(reasoning)
            .into_iter()
            .map(|agent| Arc::new(agent) as Arc<dyn Stage>)
            .collect();
        Self::new(stages, search, assembler)
    }

    /// Builds the travel planner against the HTTP backends and a file store.
    ///
    /// # Errors
    ///
    /// Returns [`TripflowError::MissingCredential`] if either credential is
    /// absent.
    #[cfg(feature = "http")]
    pub fn from_config(config: &crate::config::TripflowConfig) -> Result<Self, TripflowError> {
        use crate::clients::{OpenAiCompatibleBackend, RateLimitGate, SerperBackend};
        use crate::report::FileReportStore;

        let reasoning_backend = OpenAiCompatibleBackend::new(
            &config.reasoning.base_url,
            config.reasoning.api_key.clone(),
            &config.reasoning.model,
            config.reasoning.settings.timeout,
        )?;
        let search_backend = SerperBackend::new(&config.search.base_url, config.search.api_key.clone())?;

        let reasoning = ReasoningClient::new(Arc::new(reasoning_backend)).with_settings(config.reasoning.settings.clone());
        let search = SearchClient::new(Arc::new(search_backend), Arc::new(RateLimitGate::default()))
            .with_settings(config.search.settings.clone());
        let assembler = ReportAssembler::new(
            Arc::new(FileReportStore::new(&config.reports_dir)),
            &config.reasoning.model,
        );

        Ok(Self::travel_planner(&reasoning, search, assembler)
            .with_retry(config.retry.clone())
            .with_channel_capacity(config.progress_capacity))
    }

    /// Sets the stage retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the per-run progress channel capacity.
    #[must_use]
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Stage names in execution order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// The retry policy.
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// The report assembler.
    #[must_use]
    pub fn assembler(&self) -> &ReportAssembler {
        &self.assembler
    }

    /// Runs a request to completion.
    ///
    /// # Errors
    ///
    /// Returns [`TripflowError::Validation`] if the request is invalid. No
    /// stage runs in that case. Stage and storage failures are reported
    /// through the returned run's status instead.
    pub async fn run(&self, request: TripRequest, sink: impl ProgressSink + 'static) -> Result<PipelineRun, TripflowError> {
        self.run_with_cancel(request, sink, CancellationToken::new()).await
    }

    /// Runs a request to completion, stopping early if `token` is cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`TripflowError::Validation`] if the request is invalid.
    pub async fn run_with_cancel(
        &self,
        request: TripRequest,
        sink: impl ProgressSink + 'static,
        token: CancellationToken,
    ) -> Result<PipelineRun, TripflowError> {
        request.validate()?;
        let run = RwLock::new(PipelineRun::new(RunId::new(), request));
        let channel = ProgressChannel::new(self.channel_capacity);
        let emitter = self.emitter(&run, sink, &channel);
        self.drive(&run, &emitter, &channel, &token).await;
        let finished = run.read().clone();
        Ok(finished)
    }

    /// Validates the request and drives the run on a new task.
    ///
    /// # Errors
    ///
    /// Returns [`TripflowError::Validation`] if the request is invalid.
    pub fn spawn(&self, request: TripRequest, sink: impl ProgressSink + 'static) -> Result<RunHandle, TripflowError> {
        request.validate()?;
        let id = RunId::new();
        let run = Arc::new(RwLock::new(PipelineRun::new(id, request)));
        let channel = ProgressChannel::new(self.channel_capacity);
        let first = channel.subscribe();
        let emitter = self.emitter(&run, sink, &channel);
        let token = CancellationToken::new();

        let this = self.clone();
        let state = Arc::clone(&run);
        let task_token = token.clone();
        let task_channel = channel.clone();
        let task = tokio::spawn(async move {
            this.drive(&state, &emitter, &task_channel, &task_token).await;
        });

        Ok(RunHandle::new(id, run, token, channel, first, task))
    }

    /// Reads the stored report of a completed run.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if the run is unknown or produced
    /// no report.
    pub async fn report_for(&self, run_id: RunId) -> Result<String, TripflowError> {
        let key = self
            .reports
            .get(&run_id)
            .map(|k| k.value().clone())
            .ok_or_else(|| StorageError::NotFound(run_id.to_string()))?;
        Ok(self.assembler.store().read(&key).await?)
    }

    fn emitter(
        &self,
        run: &RwLock<PipelineRun>,
        sink: impl ProgressSink + 'static,
        channel: &ProgressChannel,
    ) -> ProgressEmitter {
        let sinks: Vec<Arc<dyn ProgressSink>> = vec![Arc::new(sink), Arc::new(channel.clone())];
        ProgressEmitter::new(run.read().id, sinks)
    }

    async fn drive(
        &self,
        run: &RwLock<PipelineRun>,
        emitter: &ProgressEmitter,
        channel: &ProgressChannel,
        token: &CancellationToken,
    ) {
        let (id, request) = {
            let run = run.read();
            (run.id, run.request.clone())
        };
        let span = info_span!(
            "pipeline_run",
            run_id = %id,
            origin = %request.origin,
            destination = %request.destination
        );
        self.drive_stages(run, &request, emitter, token)
            .instrument(span.clone())
            .await;

        let metrics = channel.metrics();
        span.in_scope(|| {
            debug!(
                emitted = metrics.emitted(),
                dropped = metrics.dropped(),
                subscribers = channel.subscriber_count(),
                "Progress channel totals"
            );
        });
    }

    async fn drive_stages(
        &self,
        run: &RwLock<PipelineRun>,
        request: &TripRequest,
        emitter: &ProgressEmitter,
        token: &CancellationToken,
    ) {
        let session = self.search.session();
        set_status(run, RunStatus::Running, None);
        emitter.run_event(ProgressEventKind::RunStarted, Some(request.summary()));
        info!(stages = self.stages.len(), "Run started");

        for stage in &self.stages {
            if token.is_cancelled() {
                cancel(run, emitter, token, None);
                return;
            }

            match self.run_stage(stage.as_ref(), run, request, &session, emitter, token).await {
                StageOutcome::Succeeded(result) => {
                    info!(
                        stage = stage.name(),
                        attempts = result.attempts,
                        elapsed_ms = result.elapsed_ms,
                        "Stage succeeded"
                    );
                    run.write().push_result(result);
                    emitter.stage_event(stage.name(), ProgressEventKind::Succeeded, None);
                }
                StageOutcome::Failed(result) => {
                    let reason = format!(
                        "stage {} failed after {} attempt(s): {}",
                        result.stage,
                        result.attempts,
                        result.error.as_deref().unwrap_or("unknown error")
                    );
                    error!(stage = stage.name(), status = %result.status, "{reason}");
                    emitter.stage_event(stage.name(), ProgressEventKind::Failed, result.error.clone());
                    run.write().push_result(result);
                    set_status(run, RunStatus::Failed, Some(reason.clone()));
                    emitter.run_event(ProgressEventKind::RunFailed, Some(reason));
                    return;
                }
                StageOutcome::Cancelled => {
                    cancel(run, emitter, token, Some(stage.name()));
                    return;
                }
            }
        }

        if token.is_cancelled() {
            cancel(run, emitter, token, None);
            return;
        }
        self.publish(run, emitter).await;
    }

    async fn run_stage(
        &self,
        stage: &dyn Stage,
        run: &RwLock<PipelineRun>,
        request: &TripRequest,
        session: &SearchSession,
        emitter: &ProgressEmitter,
        token: &CancellationToken,
    ) -> StageOutcome {
        let name = stage.name();
        // Every attempt sees the same context; it only grows on success.
        let context = run.read().context();
        let mut attempt = 1;

        loop {
            emitter.stage_event(name, ProgressEventKind::Started, Some(format!("attempt {attempt}")));
            let input = StageInput {
                request,
                context: &context,
                search: session,
                progress: emitter,
                attempt,
            };

            let started = Instant::now();
            let span = info_span!("stage", name, attempt);
            let result = tokio::select! {
                biased;
                () = token.cancelled() => return StageOutcome::Cancelled,
                result = stage.execute(input).instrument(span) => result,
            };
            let result = result.with_elapsed(started.elapsed()).with_attempts(attempt);

            if result.is_success() {
                return StageOutcome::Succeeded(result);
            }
            if !result.status.is_retryable() || !self.retry.allows_retry(attempt) {
                return StageOutcome::Failed(result);
            }

            let delay = self.retry.delay_for(attempt, result.retry_after);
            let error = result.error.as_deref().unwrap_or("unknown error");
            warn!(
                stage = name,
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error,
                "Stage failed, retrying"
            );
            emitter.stage_event(
                name,
                ProgressEventKind::Retrying,
                Some(format!(
                    "attempt {attempt} failed ({error}), retrying in {:.1}s",
                    delay.as_secs_f64()
                )),
            );

            if token.is_cancelled() {
                return StageOutcome::Cancelled;
            }
            tokio::select! {
                biased;
                () = token.cancelled() => return StageOutcome::Cancelled,
                () = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }

    async fn publish(&self, run: &RwLock<PipelineRun>, emitter: &ProgressEmitter) {
        let snapshot = run.read().clone();
        match self.assembler.publish(&snapshot).await {
            Ok((_, key)) => {
                self.reports.insert(snapshot.id, key.clone());
                run.write().report_key = Some(key.clone());
                set_status(run, RunStatus::Completed, None);
                info!(key = %key, "Run completed");
                emitter.run_event(ProgressEventKind::RunCompleted, Some(key));
            }
            Err(e) => {
                let reason = format!("report could not be stored: {e}");
                error!("{reason}");
                set_status(run, RunStatus::Failed, Some(reason.clone()));
                emitter.run_event(ProgressEventKind::RunFailed, Some(reason));
            }
        }
    }
}

impl std::fmt::Debug for PipelineController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineController")
            .field("stages", &self.stage_names())
            .field("retry", &self.retry)
            .field("channel_capacity", &self.channel_capacity)
            .finish_non_exhaustive()
    }
}

/// Moves the run to `status`, recording `reason` first.
fn set_status(run: &RwLock<PipelineRun>, status: RunStatus, reason: Option<String>) {
    let mut run = run.write();
    if reason.is_some() {
        run.failure_reason = reason;
    }
    if let Err(e) = run.transition(status) {
        error!(error = %e, "Run status not updated");
    }
}

fn cancel(run: &RwLock<PipelineRun>, emitter: &ProgressEmitter, token: &CancellationToken, stage: Option<&str>) {
    let reason = token.reason().unwrap_or_else(|| "cancelled".to_string());
    warn!(stage, reason = %reason, "Run cancelled");
    set_status(run, RunStatus::Cancelled, Some(reason.clone()));
    match stage {
        Some(stage) => emitter.stage_event(stage, ProgressEventKind::Cancelled, Some(reason)),
        None => emitter.run_event(ProgressEventKind::Cancelled, Some(reason)),
    }
}
