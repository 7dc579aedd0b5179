//! User-initiated cancellation of a generation job.
//!
//! [`CancellationController::cancel`] refuses terminal jobs without any
//! network call, asks a [`ConfirmationGate`] before sending anything, and
//! only touches tracker state once the server has accepted the request.

use std::sync::Arc;

use async_trait::async_trait;
use schedgen_core::generation::JobStatus;
use schedgen_core::progress::ProgressState;
use schedgen_core::types::JobId;

use crate::cache::ProgressCache;
use crate::poller::PollerHandle;
use crate::transport::{ProgressTransport, TransportError};

/// The explicit confirmation step in front of every cancel request.
#[async_trait]
pub trait ConfirmationGate: Send + Sync {
    /// Return `true` to go ahead with cancelling `job_id`.
    async fn confirm(&self, job_id: &JobId) -> bool;
}

/// Gate that always confirms, for non-interactive callers.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysConfirm;

#[async_trait]
impl ConfirmationGate for AlwaysConfirm {
    async fn confirm(&self, _job_id: &JobId) -> bool {
        true
    }
}

/// Errors from a cancellation attempt. None of them change tracker state.
#[derive(Debug, thiserror::Error)]
pub enum CancelError {
    /// The job is already terminal; no request was sent.
    #[error("Cannot cancel {0} process")]
    InvalidState(JobStatus),

    /// The user declined the confirmation; no request was sent.
    #[error("Cancellation not confirmed")]
    Declined,

    /// The server refused, with its own explanation.
    #[error("{0}")]
    Rejected(String),

    /// The request could not be delivered.
    #[error("Failed to cancel generation: {0}")]
    Transport(TransportError),
}

impl From<TransportError> for CancelError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Rejected(message) => Self::Rejected(message),
            other => Self::Transport(other),
        }
    }
}

/// Validates and issues cancel requests.
pub struct CancellationController {
    transport: Arc<dyn ProgressTransport>,
    cache: Arc<dyn ProgressCache>,
}

impl CancellationController {
    pub fn new(transport: Arc<dyn ProgressTransport>, cache: Arc<dyn ProgressCache>) -> Self {
        Self { transport, cache }
    }

    /// Cancel `job_id`, currently displayed as `current_status`.
    ///
    /// With a poller, its status is checked again once the gate confirms,
    /// so a job that finished during confirmation is never sent a cancel.
    ///
    /// On success the job moves to `Cancelled`: the poller (if any) is
    /// stopped and fires its terminal callback, and the cache entry is
    /// cleared. If the poller reached another terminal status while the
    /// request was in flight, that state is returned unchanged.
    ///
    /// On any error the state is untouched and a running poller carries on.
    pub async fn cancel(
        &self,
        job_id: &JobId,
        current_status: JobStatus,
        poller: Option<&PollerHandle>,
        gate: &dyn ConfirmationGate,
    ) -> Result<ProgressState, CancelError> {
        if current_status.is_terminal() {
            tracing::info!(job_id = %job_id, status = %current_status, "Refusing to cancel terminal job");
            return Err(CancelError::InvalidState(current_status));
        }

        if !gate.confirm(job_id).await {
            tracing::info!(job_id = %job_id, "Cancellation declined");
            return Err(CancelError::Declined);
        }

        // The job may have finished while the gate was waiting.
        if let Some(status) = poller.map(|handle| handle.state().status) {
            if status.is_terminal() {
                tracing::info!(job_id = %job_id, %status, "Job finished during confirmation, not cancelling");
                return Err(CancelError::InvalidState(status));
            }
        }

        if let Err(e) = self.transport.cancel_job(job_id).await {
            tracing::warn!(job_id = %job_id, error = %e, "Cancel request failed");
            return Err(e.into());
        }

        tracing::info!(job_id = %job_id, "Generation cancelled");

        match poller {
            Some(handle) => {
                if !handle.finish_cancelled() {
                    tracing::debug!(job_id = %job_id, "Job finished before the cancel landed");
                }
                Ok(handle.state())
            }
            None => {
                let last = self.cache.get(job_id).unwrap_or_default();
                if let Err(e) = self.cache.clear(job_id) {
                    tracing::warn!(job_id = %job_id, error = %e, "Failed to clear progress cache");
                }
                Ok(last.cancelled())
            }
        }
    }
}
