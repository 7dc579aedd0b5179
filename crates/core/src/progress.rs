//! The client's last known view of a generation job.

use serde::{Deserialize, Serialize};

use crate::generation::{state_machine, JobStatus};
use crate::messages::{PHASE_CANCELLED, PHASE_INITIALIZING, PHASE_QUEUED};
use crate::stage::{self, Stage};

/// Snapshot of a job's progress as last reported (or synthesized).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressState {
    /// Percent complete, always within `0..=100`.
    pub percent: u8,
    pub status: JobStatus,
    /// Free-text description of the current activity.
    pub phase_label: String,
    pub time_remaining_seconds: Option<u64>,
}

impl Default for ProgressState {
    fn default() -> Self {
        Self::queued()
    }
}

impl ProgressState {
    /// State of a freshly mounted tracker with nothing cached.
    pub fn queued() -> Self {
        Self {
            percent: 0,
            status: JobStatus::Queued,
            phase_label: PHASE_QUEUED.to_string(),
            time_remaining_seconds: None,
        }
    }

    /// State shown while the job record is not yet visible on the server.
    pub fn initializing() -> Self {
        Self {
            percent: 0,
            status: JobStatus::Initializing,
            phase_label: PHASE_INITIALIZING.to_string(),
            time_remaining_seconds: None,
        }
    }

    /// Build a state from raw server values.
    ///
    /// `percent` is clamped to `0..=100`; a missing label falls back to the
    /// name of the stage for that percent.
    pub fn reported(
        percent: f64,
        status: JobStatus,
        phase_label: Option<String>,
        time_remaining_seconds: Option<i64>,
    ) -> Self {
        let percent = clamp_percent(percent);
        let phase_label = phase_label
            .filter(|label| !label.trim().is_empty())
            .unwrap_or_else(|| stage::resolve(percent).name.to_string());
        Self {
            percent,
            status,
            phase_label,
            time_remaining_seconds: time_remaining_seconds.and_then(|s| u64::try_from(s).ok()),
        }
    }

    /// This state moved into `Cancelled`, keeping the last percent.
    pub fn cancelled(&self) -> Self {
        Self {
            percent: self.percent,
            status: JobStatus::Cancelled,
            phase_label: PHASE_CANCELLED.to_string(),
            time_remaining_seconds: None,
        }
    }

    /// Merge a newer report into this state.
    ///
    /// Percent, label and estimate are taken as reported, even when the
    /// percent goes down. The status follows the state machine: it never
    /// moves backward and never leaves a terminal status.
    pub fn advance(&self, next: ProgressState) -> ProgressState {
        if self.status.is_terminal() {
            return self.clone();
        }
        ProgressState {
            status: state_machine::next_status(self.status, next.status),
            ..next
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Stage derived from the current percent.
    pub fn stage(&self) -> &'static Stage {
        stage::resolve(self.percent)
    }

    /// Remaining-time estimate formatted for display, e.g. `"2m 30s"`.
    pub fn time_remaining_display(&self) -> Option<String> {
        self.time_remaining_seconds.map(format_duration)
    }
}

/// Round and clamp a server-reported percent into `0..=100`.
pub fn clamp_percent(raw: f64) -> u8 {
    if raw.is_nan() {
        return 0;
    }
    raw.round().clamp(0.0, 100.0) as u8
}

fn format_duration(secs: u64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    if hours > 0 {
        format!("{hours}h {minutes:02}m")
    } else if minutes > 0 {
        format!("{minutes}m {seconds:02}s")
    } else {
        format!("{seconds}s")
    }
}
