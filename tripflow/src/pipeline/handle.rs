//! Handle to a run executing on its own task.

use crate::cancellation::CancellationToken;
use crate::core::{Context, PipelineRun, RunStatus};
use crate::events::{ProgressChannel, ProgressStream};
use crate::utils::RunId;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::error;

/// Observes and controls a spawned run.
///
/// Status and context can be polled at any time. The first call to
/// [`RunHandle::subscribe`] returns a stream opened before the run started, so
/// it sees every event; later calls only see events from then on.
#[derive(Debug)]
pub struct RunHandle {
    id: RunId,
    run: Arc<RwLock<PipelineRun>>,
    token: CancellationToken,
    channel: ProgressChannel,
    first: Mutex<Option<ProgressStream>>,
    task: JoinHandle<()>,
}

impl RunHandle {
    pub(crate) fn new(
        id: RunId,
        run: Arc<RwLock<PipelineRun>>,
        token: CancellationToken,
        channel: ProgressChannel,
        first: ProgressStream,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            id,
            run,
            token,
            channel,
            first: Mutex::new(Some(first)),
            task,
        }
    }

    /// The run identifier.
    #[must_use]
    pub fn id(&self) -> RunId {
        self.id
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> RunStatus {
        self.run.read().status
    }

    /// A copy of the run as it stands.
    #[must_use]
    pub fn snapshot(&self) -> PipelineRun {
        self.run.read().clone()
    }

    /// Outputs of the stages that have succeeded so far.
    #[must_use]
    pub fn context(&self) -> Context {
        self.run.read().context()
    }

    /// Requests cancellation. The run stops at the next check point.
    pub fn cancel(&self, reason: impl Into<String>) {
        self.token.cancel(reason);
    }

    /// Returns true once cancellation was requested.
    #[must_use]
    pub fn is_cancel_requested(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Opens a live progress stream.
    #[must_use]
    pub fn subscribe(&self) -> ProgressStream {
        self.first.lock().take().unwrap_or_else(|| self.channel.subscribe())
    }

    /// Returns true once the run's task has ended.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the run to end and returns its final state.
    pub async fn wait(self) -> PipelineRun {
        if let Err(e) = self.task.await {
            error!(run_id = %self.id, error = %e, "Run task ended abnormally");
        }
        let run = self.run.read().clone();
        run
    }
}
