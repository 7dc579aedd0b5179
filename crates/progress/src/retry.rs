//! Tolerance for "not found" responses right after job submission.
//!
//! A job id can reach the tracker before the backend's status record is
//! visible. [`RaceRetryPolicy`] absorbs a contiguous run of not-found
//! responses up to a maximum; any other response resets the run.

/// Default number of consecutive not-found responses tolerated.
pub const DEFAULT_MAX_NOT_FOUND: u32 = 5;

/// What the poller should do after a not-found response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Still inside the tolerance window; `attempt` counts from 1.
    Tolerate { attempt: u32 },
    /// The run exceeded the maximum; the job is treated as missing.
    Exhausted { attempts: u32 },
}

/// Counter of consecutive not-found responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaceRetryPolicy {
    consecutive: u32,
    max: u32,
}

impl Default for RaceRetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_NOT_FOUND)
    }
}

impl RaceRetryPolicy {
    pub fn new(max: u32) -> Self {
        Self { consecutive: 0, max }
    }

    /// Record a not-found response.
    pub fn record_not_found(&mut self) -> RetryDecision {
        self.consecutive = self.consecutive.saturating_add(1);
        if self.consecutive > self.max {
            RetryDecision::Exhausted {
                attempts: self.consecutive,
            }
        } else {
            RetryDecision::Tolerate {
                attempt: self.consecutive,
            }
        }
    }

    /// Record any response other than not-found, ending the run.
    pub fn record_success(&mut self) {
        self.consecutive = 0;
    }

    /// Length of the current run of not-found responses.
    pub fn count(&self) -> u32 {
        self.consecutive
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    /// Not-found responses still tolerated before the next one is fatal.
    pub fn remaining(&self) -> u32 {
        self.max.saturating_sub(self.consecutive)
    }

    pub fn is_exhausted(&self) -> bool {
        self.consecutive > self.max
    }
}
