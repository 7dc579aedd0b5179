//! Terminal rendering of a tracked job.

use std::sync::Mutex;

use schedgen_core::progress::ProgressState;
use schedgen_core::stage::Stage;
use schedgen_core::types::JobId;
use schedgen_progress::poller::Termination;
use schedgen_progress::tracker::TrackerListener;

/// Width of the textual progress bar, in cells.
const BAR_WIDTH: usize = 20;

/// Process exit status for a successful run.
pub const EXIT_COMPLETED: u8 = 0;
/// Process exit status when the job failed or could not be tracked.
pub const EXIT_FAILED: u8 = 1;
/// Process exit status when the job was cancelled (as for SIGINT).
pub const EXIT_CANCELLED: u8 = 130;

/// One display line for `state`, e.g.
/// `[#####---------------]  25% Scheduling Classes (running), ~1m 30s left`.
pub fn progress_line(state: &ProgressState, stage: &Stage) -> String {
    let filled = usize::from(state.percent.min(100)) * BAR_WIDTH / 100;
    let bar = format!("{}{}", "#".repeat(filled), "-".repeat(BAR_WIDTH - filled));

    let mut line = format!(
        "[{bar}] {:>3}% {} ({})",
        state.percent, state.phase_label, state.status
    );
    if state.phase_label != stage.name {
        line.push_str(&format!(" [{}]", stage.name));
    }
    if let Some(remaining) = state.time_remaining_display() {
        line.push_str(&format!(", ~{remaining} left"));
    }
    line
}

/// Exit status for how tracking ended.
pub fn exit_status(termination: Option<&Termination>) -> u8 {
    match termination {
        Some(Termination::Completed(_)) => EXIT_COMPLETED,
        Some(Termination::Cancelled) => EXIT_CANCELLED,
        Some(_) | None => EXIT_FAILED,
    }
}

/// Prints progress lines to stdout and mirrors them into the log.
///
/// Consecutive identical lines are printed once, so the repeated
/// "initializing" ticks of the submission race do not flood the terminal.
#[derive(Default)]
pub struct LineListener {
    last_line: Mutex<Option<String>>,
}

impl LineListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `line`, returning `false` if it repeats the previous one.
    pub fn record(&self, line: &str) -> bool {
        let mut last = self
            .last_line
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if last.as_deref() == Some(line) {
            return false;
        }
        *last = Some(line.to_string());
        true
    }
}

impl TrackerListener for LineListener {
    fn on_update(&self, state: &ProgressState, stage: &Stage) {
        let line = progress_line(state, stage);
        if self.record(&line) {
            tracing::debug!(percent = state.percent, status = %state.status, stage = stage.name, "Progress");
            println!("{line}");
        }
    }

    fn on_complete(&self, job_id: &JobId) {
        tracing::info!(job_id = %job_id, "Generation completed");
        println!("Generation {job_id} completed.");
    }

    fn on_cancel(&self) {
        tracing::info!("Generation cancelled");
        println!("Generation cancelled.");
    }

    fn on_error(&self, message: &str) {
        tracing::error!(error = %message, "Generation tracking failed");
        eprintln!("Error: {message}");
    }
}
