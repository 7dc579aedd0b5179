//! The network seam the poller and cancellation controller depend on.
//!
//! [`GenerationApi`](crate::api::GenerationApi) is the production
//! implementation; tests substitute scripted fakes.

use async_trait::async_trait;
use schedgen_core::generation::JobStatus;
use schedgen_core::messages::MSG_GENERATION_FAILED;
use schedgen_core::progress::ProgressState;
use schedgen_core::types::JobId;
use serde::{Deserialize, Serialize};

/// Body of a successful `GET <base>/progress/{jobId}/` response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressPayload {
    /// Percent complete. Sent as an integer, accepted as any number.
    #[serde(default)]
    pub progress: f64,
    pub status: String,
    #[serde(default)]
    pub stage: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub time_remaining_seconds: Option<i64>,
    /// Failure detail, present on some `failed` responses.
    #[serde(default)]
    pub error: Option<String>,
}

impl ProgressPayload {
    /// Convenience constructor, mostly for tests and fakes.
    pub fn new(progress: f64, status: impl Into<String>) -> Self {
        Self {
            progress,
            status: status.into(),
            ..Default::default()
        }
    }

    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Parsed status, or `None` for a value the client does not recognise.
    pub fn job_status(&self) -> Option<JobStatus> {
        JobStatus::parse(&self.status).ok()
    }

    /// Build the display state this payload describes.
    ///
    /// An unrecognised status is reported as `fallback`.
    pub fn to_state(&self, fallback: JobStatus) -> ProgressState {
        let status = self.job_status().unwrap_or(fallback);
        let label = self.stage.clone().or_else(|| self.message.clone());
        ProgressState::reported(self.progress, status, label, self.time_remaining_seconds)
    }

    /// Human-readable reason for a `failed` status.
    pub fn failure_message(&self) -> String {
        [&self.error, &self.message, &self.stage]
            .into_iter()
            .flatten()
            .find(|m| !m.trim().is_empty())
            .cloned()
            .unwrap_or_else(|| MSG_GENERATION_FAILED.to_string())
    }
}

/// Errors from the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The server has no record of this job (yet).
    #[error("Job {0} not found")]
    NotFound(JobId),

    /// The request did not complete within the configured timeout.
    #[error("Request timed out")]
    Timeout,

    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[source] reqwest::Error),

    /// The server rejected the credentials and no refresh was possible.
    #[error("Not authorized")]
    Unauthorized,

    /// The session could not be refreshed; the user must sign in again.
    #[error("Session expired")]
    SessionExpired,

    /// The server refused the request with an explanatory message.
    #[error("{0}")]
    Rejected(String),

    /// Any other non-2xx status code.
    #[error("Server error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The response body was not the expected JSON.
    #[error("Malformed response: {0}")]
    Decode(String),

    /// Failure raised by a non-HTTP transport.
    #[error("Transport unavailable: {0}")]
    Unavailable(String),
}

impl TransportError {
    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Request(err)
        }
    }

    /// Whether this error means the session is gone for good.
    pub fn is_session_loss(&self) -> bool {
        matches!(self, Self::SessionExpired)
    }
}

/// Status and cancellation calls for generation jobs.
#[async_trait]
pub trait ProgressTransport: Send + Sync {
    /// Fetch the current progress of `job_id`.
    async fn fetch_progress(&self, job_id: &JobId) -> Result<ProgressPayload, TransportError>;

    /// Ask the server to cancel `job_id`.
    async fn cancel_job(&self, job_id: &JobId) -> Result<(), TransportError>;
}
