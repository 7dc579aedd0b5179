//! One tracked generation job: hydrate, poll, cancel.
//!
//! [`GenerationTracker::mount`] renders the last cached state straight
//! away, then starts exactly one [`JobStatusPoller`] for the job. The
//! listener hears about every state change and, at most once each, about
//! completion, cancellation or a fatal error.

use std::sync::Arc;

use schedgen_core::progress::ProgressState;
use schedgen_core::stage::Stage;
use schedgen_core::types::JobId;
use tokio::sync::watch;

use crate::api::GenerationApi;
use crate::cache::{FileCache, ProgressCache};
use crate::cancel::{CancelError, CancellationController, ConfirmationGate};
use crate::config::TrackerConfig;
use crate::poller::{JobStatusPoller, PollListener, PollerConfig, PollerHandle, Termination};
use crate::session::Session;
use crate::transport::{ProgressTransport, TransportError};

/// Callbacks into the caller's navigation layer.
pub trait TrackerListener: Send + Sync {
    /// A state was displayed, with the stage derived from its percent.
    fn on_update(&self, _state: &ProgressState, _stage: &Stage) {}

    /// The job completed.
    fn on_complete(&self, _job_id: &JobId) {}

    /// The job was cancelled.
    fn on_cancel(&self) {}

    /// Tracking ended with a user-visible error.
    fn on_error(&self, _message: &str) {}
}

/// Collaborators a tracker is built from.
#[derive(Clone)]
pub struct TrackerDeps {
    pub transport: Arc<dyn ProgressTransport>,
    pub cache: Arc<dyn ProgressCache>,
    pub poller: PollerConfig,
}

impl TrackerDeps {
    pub fn new(
        transport: Arc<dyn ProgressTransport>,
        cache: Arc<dyn ProgressCache>,
        poller: PollerConfig,
    ) -> Self {
        Self {
            transport,
            cache,
            poller,
        }
    }

    /// Production wiring: HTTP API, on-disk cache, configured credentials.
    pub fn from_config(config: &TrackerConfig) -> Result<Self, TransportError> {
        let session = Arc::new(Session::new(
            config.access_token.clone(),
            config.refresh_token.clone(),
        ));
        let api = GenerationApi::new(config.api_url.clone(), session, config.request_timeout)?;
        Ok(Self::new(
            Arc::new(api),
            Arc::new(FileCache::new(config.cache_dir.clone())),
            config.poller_config(),
        ))
    }
}

/// A mounted tracker for one job.
pub struct GenerationTracker {
    tracker_id: uuid::Uuid,
    job_id: JobId,
    poller: PollerHandle,
    canceller: CancellationController,
}

impl GenerationTracker {
    /// Mount a tracker for `job_id` and start polling.
    ///
    /// Must be called from within a tokio runtime.
    pub fn mount(job_id: JobId, deps: TrackerDeps, listener: Arc<dyn TrackerListener>) -> Self {
        let tracker_id = uuid::Uuid::new_v4();
        let initial = hydrate(&job_id, deps.cache.as_ref());

        tracing::info!(
            job_id = %job_id,
            %tracker_id,
            percent = initial.percent,
            status = %initial.status,
            "Mounting generation tracker",
        );
        listener.on_update(&initial, initial.stage());

        let bridge = Arc::new(ListenerBridge {
            job_id: job_id.clone(),
            listener,
        });
        let poller = JobStatusPoller::new(
            Arc::clone(&deps.transport),
            Arc::clone(&deps.cache),
            deps.poller,
        )
        .start_from(job_id.clone(), initial, bridge);

        Self {
            tracker_id,
            job_id,
            poller,
            canceller: CancellationController::new(deps.transport, deps.cache),
        }
    }

    pub fn tracker_id(&self) -> uuid::Uuid {
        self.tracker_id
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn state(&self) -> ProgressState {
        self.poller.state()
    }

    pub fn stage(&self) -> &'static Stage {
        self.poller.state().stage()
    }

    pub fn subscribe(&self) -> watch::Receiver<ProgressState> {
        self.poller.subscribe()
    }

    pub fn termination(&self) -> Option<Termination> {
        self.poller.termination()
    }

    pub fn is_active(&self) -> bool {
        !self.poller.is_stopped()
    }

    /// Number of status requests issued so far.
    pub fn requests_issued(&self) -> u64 {
        self.poller.ticks_issued()
    }

    /// Cancel the job after confirmation through `gate`.
    pub async fn cancel(&self, gate: &dyn ConfirmationGate) -> Result<ProgressState, CancelError> {
        let current = self.poller.state().status;
        self.canceller
            .cancel(&self.job_id, current, Some(&self.poller), gate)
            .await
    }

    /// Resolves once polling has ended for any reason.
    pub async fn stopped(&self) {
        self.poller.stopped().await;
    }

    /// Stop polling without cancelling the job. Idempotent.
    ///
    /// The cache entry is kept, so mounting again resumes from it.
    pub fn unmount(&self) -> bool {
        let stopped = self.poller.stop();
        if stopped {
            tracing::info!(job_id = %self.job_id, tracker_id = %self.tracker_id, "Generation tracker unmounted");
        }
        stopped
    }
}

/// Initial state: the cached entry when there is a live one, else queued.
///
/// A terminal entry can only be left behind by an interrupted cleanup, so
/// it is removed instead of being displayed.
fn hydrate(job_id: &JobId, cache: &dyn ProgressCache) -> ProgressState {
    match cache.get(job_id) {
        Some(state) if state.is_terminal() => {
            tracing::debug!(job_id = %job_id, status = %state.status, "Dropping stale terminal cache entry");
            if let Err(e) = cache.clear(job_id) {
                tracing::warn!(job_id = %job_id, error = %e, "Failed to clear progress cache");
            }
            ProgressState::queued()
        }
        Some(state) => state,
        None => ProgressState::queued(),
    }
}

/// Adapts poller callbacks to [`TrackerListener`].
struct ListenerBridge {
    job_id: JobId,
    listener: Arc<dyn TrackerListener>,
}

impl PollListener for ListenerBridge {
    fn on_update(&self, state: &ProgressState) {
        self.listener.on_update(state, state.stage());
    }

    fn on_finished(&self, termination: &Termination) {
        match termination {
            Termination::Completed(_) => self.listener.on_complete(&self.job_id),
            Termination::Cancelled => self.listener.on_cancel(),
            Termination::Failed { .. }
            | Termination::JobNotFound { .. }
            | Termination::SessionExpired => {
                if let Some(message) = termination.error_message() {
                    self.listener.on_error(&message);
                }
            }
        }
    }
}
