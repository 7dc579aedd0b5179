//! Repeating status poll for one generation job.
//!
//! [`JobStatusPoller::start`] spawns a task that requests the job's status
//! on a fixed interval until the job reaches a terminal status, a fatal
//! error occurs, or the returned [`PollerHandle`] is stopped.
//!
//! Each request is awaited inside its tick, so there is never more than
//! one request in flight and responses are applied in the order they were
//! issued. Ticks that elapse during a slow request are skipped. The task
//! races every request against the handle's [`CancellationToken`], so a
//! response arriving after [`PollerHandle::stop`] is dropped.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use schedgen_core::generation::JobStatus;
use schedgen_core::messages::{MSG_JOB_NOT_FOUND, MSG_SESSION_EXPIRED};
use schedgen_core::progress::ProgressState;
use schedgen_core::types::JobId;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::cache::ProgressCache;
use crate::retry::{RaceRetryPolicy, RetryDecision, DEFAULT_MAX_NOT_FOUND};
use crate::transport::{ProgressPayload, ProgressTransport, TransportError};

/// Default delay between status requests.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Default upper bound on a single status request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Tunable parameters for a poller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollerConfig {
    /// Delay between ticks. Must be non-zero.
    pub interval: Duration,
    /// Upper bound on a single status request. Must be non-zero.
    pub request_timeout: Duration,
    /// Consecutive not-found responses tolerated after submission.
    pub max_not_found: u32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_not_found: DEFAULT_MAX_NOT_FOUND,
        }
    }
}

// ---------------------------------------------------------------------------
// Termination
// ---------------------------------------------------------------------------

/// Why a poller finished. Reported at most once per poller.
#[derive(Debug, Clone, PartialEq)]
pub enum Termination {
    /// The server declared the job completed.
    Completed(ProgressPayload),

    /// The server declared the job failed.
    Failed {
        message: String,
        payload: ProgressPayload,
    },

    /// The job was cancelled, locally or by the server.
    Cancelled,

    /// The not-found tolerance was exhausted.
    JobNotFound { attempts: u32 },

    /// The shared client signalled that the session is gone.
    SessionExpired,
}

impl Termination {
    /// Terminal job status, for the outcomes that carry one.
    pub fn status(&self) -> Option<JobStatus> {
        match self {
            Self::Completed(_) => Some(JobStatus::Completed),
            Self::Failed { .. } => Some(JobStatus::Failed),
            Self::Cancelled => Some(JobStatus::Cancelled),
            Self::JobNotFound { .. } | Self::SessionExpired => None,
        }
    }

    /// User-visible error for fatal outcomes.
    pub fn error_message(&self) -> Option<String> {
        match self {
            Self::Failed { message, .. } => Some(message.clone()),
            Self::JobNotFound { .. } => Some(MSG_JOB_NOT_FOUND.to_string()),
            Self::SessionExpired => Some(MSG_SESSION_EXPIRED.to_string()),
            Self::Completed(_) | Self::Cancelled => None,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.error_message().is_some()
    }
}

/// Receives a poller's state changes.
///
/// Callbacks run on the poller task (or on the task that cancels the job)
/// and must not block. They must not call back into the cancellation
/// controller.
pub trait PollListener: Send + Sync {
    /// A new state was published.
    fn on_update(&self, _state: &ProgressState) {}

    /// The poller finished. Called at most once.
    fn on_finished(&self, _termination: &Termination) {}
}

// ---------------------------------------------------------------------------
// JobStatusPoller
// ---------------------------------------------------------------------------

/// Spawns status-polling tasks sharing one transport and cache.
pub struct JobStatusPoller {
    transport: Arc<dyn ProgressTransport>,
    cache: Arc<dyn ProgressCache>,
    config: PollerConfig,
}

impl JobStatusPoller {
    pub fn new(
        transport: Arc<dyn ProgressTransport>,
        cache: Arc<dyn ProgressCache>,
        config: PollerConfig,
    ) -> Self {
        Self {
            transport,
            cache,
            config,
        }
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Start polling `job_id` from the default queued state.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, job_id: JobId, listener: Arc<dyn PollListener>) -> PollerHandle {
        self.start_from(job_id, ProgressState::queued(), listener)
    }

    /// Start polling `job_id`, displaying `initial` until the first response.
    pub fn start_from(
        &self,
        job_id: JobId,
        initial: ProgressState,
        listener: Arc<dyn PollListener>,
    ) -> PollerHandle {
        let (state_tx, _) = watch::channel(initial);
        let poller_id = uuid::Uuid::new_v4();

        let shared = Arc::new(PollerShared {
            job_id: job_id.clone(),
            state_tx,
            retry: Mutex::new(RaceRetryPolicy::new(self.config.max_not_found)),
            termination: Mutex::new(None),
            notify_gate: Mutex::new(()),
            finished: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            ticks: AtomicU64::new(0),
            cancel: CancellationToken::new(),
            cache: Arc::clone(&self.cache),
            listener,
        });

        let mut config = self.config.clone();
        if config.interval.is_zero() {
            tracing::warn!(job_id = %job_id, "Zero poll interval, using default");
            config.interval = DEFAULT_POLL_INTERVAL;
        }
        if config.request_timeout.is_zero() {
            tracing::warn!(job_id = %job_id, "Zero request timeout, using default");
            config.request_timeout = DEFAULT_REQUEST_TIMEOUT;
        }

        tracing::info!(
            job_id = %job_id,
            %poller_id,
            interval_ms = config.interval.as_millis() as u64,
            "Starting job status poller",
        );

        let span = tracing::info_span!("job_poller", job_id = %job_id, %poller_id);
        let task = tokio::spawn(
            run_poll_loop(Arc::clone(&shared), Arc::clone(&self.transport), config)
                .instrument(span),
        );

        PollerHandle {
            shared,
            poller_id,
            task: Some(task),
        }
    }
}

// ---------------------------------------------------------------------------
// PollerHandle
// ---------------------------------------------------------------------------

/// Owner of a running poller. Dropping the handle stops the poller.
pub struct PollerHandle {
    shared: Arc<PollerShared>,
    poller_id: uuid::Uuid,
    task: Option<JoinHandle<()>>,
}

impl PollerHandle {
    pub fn job_id(&self) -> &JobId {
        &self.shared.job_id
    }

    /// Unique id of this poller instance, as logged.
    pub fn poller_id(&self) -> uuid::Uuid {
        self.poller_id
    }

    /// Current state.
    pub fn state(&self) -> ProgressState {
        self.shared.state()
    }

    /// Watch the state; the receiver sees every published change.
    pub fn subscribe(&self) -> watch::Receiver<ProgressState> {
        self.shared.state_tx.subscribe()
    }

    /// Stop polling. Returns `false` if the poller was already stopped.
    ///
    /// Stopping does not fire the terminal callback and keeps the cache
    /// entry, so a later tracker for the same job hydrates from it.
    pub fn stop(&self) -> bool {
        let stopped = self.shared.halt();
        if stopped {
            tracing::info!(job_id = %self.shared.job_id, poller_id = %self.poller_id, "Job status poller stopped");
        }
        stopped
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    /// Whether a terminal outcome has been reported.
    pub fn is_finished(&self) -> bool {
        self.shared.finished.load(Ordering::SeqCst)
    }

    pub fn termination(&self) -> Option<Termination> {
        lock(&self.shared.termination).clone()
    }

    /// Current run of consecutive not-found responses.
    pub fn retry_count(&self) -> u32 {
        lock(&self.shared.retry).count()
    }

    /// Number of status requests issued so far.
    pub fn ticks_issued(&self) -> u64 {
        self.shared.ticks.load(Ordering::SeqCst)
    }

    /// Resolves once the poller has been stopped or has finished.
    pub async fn stopped(&self) {
        self.shared.cancel.cancelled().await;
    }

    /// Wait for the polling task itself to exit.
    pub async fn join(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!(job_id = %self.shared.job_id, error = %e, "Poller task panicked");
            }
        }
    }

    /// Move the job into `Cancelled` after the server accepted the cancel.
    ///
    /// Returns `false` if the poller had already finished, in which case
    /// its state is left as it was.
    pub(crate) fn finish_cancelled(&self) -> bool {
        let cancelled = self.shared.state().cancelled();
        self.shared
            .finish(Termination::Cancelled, Some(cancelled), true)
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.shared.halt();
    }
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

struct PollerShared {
    job_id: JobId,
    state_tx: watch::Sender<ProgressState>,
    retry: Mutex<RaceRetryPolicy>,
    termination: Mutex<Option<Termination>>,
    /// Serializes publishing against finishing so nothing is published,
    /// cached or reported after the terminal callback.
    notify_gate: Mutex<()>,
    finished: AtomicBool,
    stopped: AtomicBool,
    ticks: AtomicU64,
    cancel: CancellationToken,
    cache: Arc<dyn ProgressCache>,
    listener: Arc<dyn PollListener>,
}

impl PollerShared {
    fn state(&self) -> ProgressState {
        self.state_tx.borrow().clone()
    }

    /// Cancel the task. Returns `false` if it was already halted.
    fn halt(&self) -> bool {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.cancel.cancel();
        true
    }

    /// Publish a non-terminal state, optionally writing it through.
    fn publish(&self, state: ProgressState, persist: bool) {
        let _gate = lock(&self.notify_gate);
        if self.finished.load(Ordering::SeqCst) || self.cancel.is_cancelled() {
            return;
        }

        self.state_tx.send_replace(state.clone());
        if persist {
            if let Err(e) = self.cache.set(&self.job_id, &state) {
                tracing::warn!(job_id = %self.job_id, error = %e, "Failed to write progress cache");
            }
        }
        self.listener.on_update(&state);
    }

    /// Report a terminal outcome. Returns `false` if one was already reported.
    fn finish(
        &self,
        termination: Termination,
        final_state: Option<ProgressState>,
        clear_cache: bool,
    ) -> bool {
        let _gate = lock(&self.notify_gate);
        if self.finished.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.halt();

        if let Some(state) = final_state {
            self.state_tx.send_replace(state.clone());
            self.listener.on_update(&state);
        }
        if clear_cache {
            if let Err(e) = self.cache.clear(&self.job_id) {
                tracing::warn!(job_id = %self.job_id, error = %e, "Failed to clear progress cache");
            }
        }

        match termination.error_message() {
            Some(message) => {
                tracing::error!(job_id = %self.job_id, error = %message, "Job status polling ended")
            }
            None => tracing::info!(
                job_id = %self.job_id,
                status = ?termination.status(),
                "Job reached terminal status",
            ),
        }

        *lock(&self.termination) = Some(termination.clone());
        self.listener.on_finished(&termination);
        true
    }

    fn apply_payload(&self, tick: u64, payload: ProgressPayload) {
        lock(&self.retry).record_success();

        let current = self.state();
        if payload.job_status().is_none() {
            tracing::warn!(tick, status = %payload.status, "Unrecognised job status, keeping previous");
        }
        let next = current.advance(payload.to_state(current.status));

        if next.status == JobStatus::Running && next.percent < current.percent {
            tracing::debug!(
                tick,
                from = current.percent,
                to = next.percent,
                "Server reported decreasing progress",
            );
        }
        tracing::debug!(tick, percent = next.percent, status = %next.status, "Job progress");

        match next.status {
            JobStatus::Completed => {
                self.finish(Termination::Completed(payload), Some(next), true);
            }
            JobStatus::Failed => {
                let message = payload.failure_message();
                self.finish(Termination::Failed { message, payload }, Some(next), true);
            }
            JobStatus::Cancelled => {
                self.finish(Termination::Cancelled, Some(next), true);
            }
            JobStatus::Queued | JobStatus::Initializing | JobStatus::Running => {
                self.publish(next, true);
            }
        }
    }

    fn apply_not_found(&self, tick: u64) {
        let decision = lock(&self.retry).record_not_found();
        match decision {
            RetryDecision::Tolerate { attempt } => {
                tracing::debug!(tick, attempt, "Job not visible yet, waiting");
                let current = self.state();
                if current.status.rank() <= JobStatus::Initializing.rank() {
                    let initializing = ProgressState {
                        percent: current.percent,
                        ..ProgressState::initializing()
                    };
                    self.publish(initializing, false);
                }
            }
            RetryDecision::Exhausted { attempts } => {
                self.finish(Termination::JobNotFound { attempts }, None, true);
            }
        }
    }
}

/// Tick loop: request -> apply -> wait for the next tick.
///
/// Runs until the cancellation token is triggered.
async fn run_poll_loop(
    shared: Arc<PollerShared>,
    transport: Arc<dyn ProgressTransport>,
    config: PollerConfig,
) {
    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = shared.cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let tick = shared.ticks.fetch_add(1, Ordering::SeqCst) + 1;
        let request = tokio::time::timeout(
            config.request_timeout,
            transport.fetch_progress(&shared.job_id),
        );

        let outcome = tokio::select! {
            biased;
            _ = shared.cancel.cancelled() => {
                tracing::debug!(tick, "Discarding in-flight status request");
                break;
            }
            outcome = request => outcome,
        };

        match outcome {
            Ok(Ok(payload)) => shared.apply_payload(tick, payload),
            Ok(Err(TransportError::NotFound(_))) => shared.apply_not_found(tick),
            Ok(Err(e)) if e.is_session_loss() => {
                shared.finish(Termination::SessionExpired, None, false);
            }
            Ok(Err(e)) => {
                tracing::warn!(tick, error = %e, "Status request failed, retrying next tick");
            }
            Err(_elapsed) => {
                tracing::warn!(
                    tick,
                    timeout_ms = config.request_timeout.as_millis() as u64,
                    "Status request timed out, retrying next tick",
                );
            }
        }
    }

    tracing::debug!("Poller task exited");
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
