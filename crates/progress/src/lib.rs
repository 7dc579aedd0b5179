//! Client-side progress tracker for timetable-generation jobs.
//!
//! Monitors a long-running server job by polling its status endpoint,
//! absorbs the "not found yet" race right after submission, persists the
//! last known state so a restarted client can render it immediately, and
//! exposes cancellation behind an explicit confirmation step.
//!
//! - [`GenerationApi`]: REST client for the progress and cancel endpoints.
//! - [`JobStatusPoller`]: one cancellable polling task per job.
//! - [`CancellationController`]: validated, confirmed cancellation.
//! - [`GenerationTracker`]: hydrate, poll and cancel behind one handle.

pub mod api;
pub mod cache;
pub mod cancel;
pub mod config;
pub mod poller;
pub mod retry;
pub mod session;
pub mod tracker;
pub mod transport;

pub use api::GenerationApi;
pub use cache::{FileCache, MemoryCache, ProgressCache};
pub use cancel::{AlwaysConfirm, CancelError, CancellationController, ConfirmationGate};
pub use config::TrackerConfig;
pub use poller::{JobStatusPoller, PollListener, PollerConfig, PollerHandle, Termination};
pub use retry::{RaceRetryPolicy, RetryDecision};
pub use session::Session;
pub use tracker::{GenerationTracker, TrackerDeps, TrackerListener};
pub use transport::{ProgressPayload, ProgressTransport, TransportError};
