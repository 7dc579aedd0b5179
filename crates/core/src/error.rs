use crate::generation::JobStatus;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Unknown job status: {0}")]
    UnknownStatus(String),

    #[error("Invalid transition: {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },
}
