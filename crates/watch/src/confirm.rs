//! Interactive confirmation before cancelling a job.

use std::io::{self, BufRead, Write};

use async_trait::async_trait;
use schedgen_core::types::JobId;
use schedgen_progress::cancel::ConfirmationGate;

/// Whether a typed answer confirms. Only `y` and `yes` do, in any case.
pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Write the prompt to `output` and read one answer line from `input`.
///
/// End of input counts as "no".
pub fn prompt<R: BufRead, W: Write>(job_id: &JobId, input: &mut R, output: &mut W) -> io::Result<bool> {
    write!(output, "Cancel generation job {job_id}? [y/N] ")?;
    output.flush()?;

    let mut answer = String::new();
    if input.read_line(&mut answer)? == 0 {
        return Ok(false);
    }
    Ok(is_affirmative(&answer))
}

/// Asks on the terminal. Reads block, so they run on the blocking pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdinConfirm;

#[async_trait]
impl ConfirmationGate for StdinConfirm {
    async fn confirm(&self, job_id: &JobId) -> bool {
        let job_id = job_id.clone();
        let answer = tokio::task::spawn_blocking(move || {
            prompt(&job_id, &mut io::stdin().lock(), &mut io::stderr())
        })
        .await;

        match answer {
            Ok(Ok(confirmed)) => confirmed,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Could not read confirmation, not cancelling");
                false
            }
            Err(e) => {
                tracing::error!(error = %e, "Confirmation prompt panicked");
                false
            }
        }
    }
}
