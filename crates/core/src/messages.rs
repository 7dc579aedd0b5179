//! User-facing phase labels and error messages.
//!
//! Kept in one place so the tracker, the watcher binary and the tests
//! agree on the exact wording.

/// Phase label synthesized while the job record is not yet visible.
pub const PHASE_INITIALIZING: &str = "Initializing generation...";

/// Phase label for a freshly mounted tracker with nothing cached.
pub const PHASE_QUEUED: &str = "Waiting to start...";

/// Phase label once a cancellation has been accepted by the server.
pub const PHASE_CANCELLED: &str = "Generation cancelled";

/// Fatal error shown after the not-found tolerance is exhausted.
pub const MSG_JOB_NOT_FOUND: &str = "Job not found. Please try again.";

/// Fatal error shown when the session could not be refreshed.
pub const MSG_SESSION_EXPIRED: &str = "Your session has expired. Please sign in again.";

/// Fallback when the server declares failure without any message.
pub const MSG_GENERATION_FAILED: &str = "Generation failed";
