//! `schedgen-watch` -- follow a timetable-generation job from the terminal.
//!
//! Mounts a progress tracker for one job, prints a progress line whenever
//! the state changes and exits once the job reaches a terminal status.
//! Ctrl-C asks for confirmation and then cancels the job on the server.
//!
//! # Usage
//!
//! `schedgen-watch <JOB_ID>` (or set `JOB_ID`).
//!
//! # Environment variables
//!
//! | Variable               | Required | Default           | Description                        |
//! |------------------------|----------|-------------------|------------------------------------|
//! | `PROGRESS_API_URL`     | yes      | --                | API base URL, e.g. `http://host/api` |
//! | `POLL_INTERVAL_MS`     | no       | `2000`            | Delay between status requests      |
//! | `REQUEST_TIMEOUT_SECS` | no       | `10`              | Per-request timeout                |
//! | `RACE_RETRY_MAX`       | no       | `5`               | Tolerated "not found" responses    |
//! | `PROGRESS_CACHE_DIR`   | no       | `.schedgen-cache` | Persistent progress cache          |
//! | `ACCESS_TOKEN`         | no       | --                | Bearer token                       |
//! | `REFRESH_TOKEN`        | no       | --                | Token used to refresh the session  |
//!
//! Exit status: `0` completed, `130` cancelled, `1` anything else.

use std::process::ExitCode;
use std::sync::Arc;

use schedgen_core::types::JobId;
use schedgen_progress::cancel::CancelError;
use schedgen_progress::config::TrackerConfig;
use schedgen_progress::tracker::{GenerationTracker, TrackerDeps};
use schedgen_watch::confirm::StdinConfirm;
use schedgen_watch::render::{exit_status, LineListener};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "schedgen_watch=info,schedgen_progress=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let job_id = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("JOB_ID").ok())
        .filter(|id| !id.trim().is_empty())
        .map(JobId::new)
        .unwrap_or_else(|| {
            tracing::error!("Job id is required: pass it as the first argument or set JOB_ID");
            std::process::exit(2);
        });

    let config = TrackerConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        std::process::exit(1);
    });

    let deps = TrackerDeps::from_config(&config).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to build HTTP client");
        std::process::exit(1);
    });

    tracing::info!(
        job_id = %job_id,
        api_url = %config.api_url,
        interval_ms = config.poll_interval.as_millis() as u64,
        cache_dir = %config.cache_dir.display(),
        "Starting schedgen-watch",
    );

    let tracker = GenerationTracker::mount(job_id, deps, Arc::new(LineListener::new()));

    loop {
        tokio::select! {
            _ = tracker.stopped() => break,
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                    tracker.stopped().await;
                    break;
                }
                match tracker.cancel(&StdinConfirm).await {
                    Ok(state) => tracing::info!(status = %state.status, "Cancel request accepted"),
                    Err(CancelError::Declined) => tracing::info!("Continuing to watch"),
                    Err(e) => tracing::warn!(error = %e, "Cancel failed"),
                }
            }
        }
    }

    ExitCode::from(exit_status(tracker.termination().as_ref()))
}
