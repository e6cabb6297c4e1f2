use jobq_common::error::QueueError;
use jobq_worker::error::{SupervisorError, WorkerError};
use thiserror::Error;

/// Top-level error for the command line surface. Every variant renders as a
/// single line on stderr; the process then exits non-zero.
#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Worker(#[from] WorkerError),
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode output: {0}")]
    Encode(#[from] serde_json::Error),
}
