//! Generation job statuses and state machine.
//!
//! Terminal statuses (Completed, Failed, Cancelled) are absorbing: once a
//! tracker has observed one, no further transition is accepted.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// JobStatus
// ---------------------------------------------------------------------------

/// Last known status of a generation job, as seen by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Queued,
    Initializing,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Whether no further transitions may leave this status.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Lowercase wire name, also used in user-facing messages.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Initializing => "initializing",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Position along the non-terminal progression. Terminal statuses all
    /// rank above every non-terminal one.
    pub fn rank(self) -> u8 {
        match self {
            Self::Queued => 0,
            Self::Initializing => 1,
            Self::Running => 2,
            Self::Completed | Self::Failed | Self::Cancelled => 3,
        }
    }

    /// Parse a server status string.
    ///
    /// Matching is case-insensitive and accepts the synonyms the job
    /// backend has been seen to emit (`pending`, `in_progress`, `canceled`...).
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "queued" | "pending" => Ok(Self::Queued),
            "initializing" | "initialising" | "starting" => Ok(Self::Initializing),
            "running" | "in_progress" | "processing" | "started" => Ok(Self::Running),
            "completed" | "complete" | "success" | "succeeded" | "done" => Ok(Self::Completed),
            "failed" | "failure" | "error" => Ok(Self::Failed),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            _ => Err(CoreError::UnknownStatus(raw.to_string())),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

pub mod state_machine {
    use super::JobStatus;
    use crate::error::CoreError;

    /// Returns the set of statuses reachable from `from`.
    ///
    /// The server may declare a terminal status at any point, so every
    /// non-terminal status can reach Completed and Failed directly.
    /// Cancelled is only ever entered through the cancellation controller.
    pub fn valid_transitions(from: JobStatus) -> &'static [JobStatus] {
        use JobStatus::*;
        match from {
            Queued => &[Initializing, Running, Completed, Failed, Cancelled],
            Initializing => &[Running, Completed, Failed, Cancelled],
            Running => &[Completed, Failed, Cancelled],
            Completed | Failed | Cancelled => &[],
        }
    }

    /// Check whether a transition from `from` to `to` is valid.
    pub fn can_transition(from: JobStatus, to: JobStatus) -> bool {
        valid_transitions(from).contains(&to)
    }

    /// Validate a state transition, returning an error for invalid ones.
    pub fn validate_transition(from: JobStatus, to: JobStatus) -> Result<(), CoreError> {
        if can_transition(from, to) {
            Ok(())
        } else {
            Err(CoreError::InvalidTransition { from, to })
        }
    }

    /// Resolve the status to display after the server reports `reported`
    /// while the tracker currently shows `current`.
    ///
    /// Repeating the current status is not a transition and is accepted.
    /// A backward move between non-terminal statuses keeps `current`, and
    /// nothing leaves a terminal status.
    pub fn next_status(current: JobStatus, reported: JobStatus) -> JobStatus {
        if current == reported || can_transition(current, reported) {
            reported
        } else {
            current
        }
    }
}
