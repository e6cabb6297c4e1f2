use std::io;
use std::path::PathBuf;

use jobq_common::error::QueueError;
use thiserror::Error;

/// Enumeration of errors related to consumption of jobs in a Worker.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("a queue error occurred while processing jobs: {0}")]
    Queue(#[from] QueueError),
}

/// Enumeration of errors related to the worker pool lifecycle.
#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("a worker supervisor is already running with pid {pid}")]
    AlreadyRunning { pid: u32 },
    #[error("no worker supervisor is running")]
    NotRunning,
    #[error("pidfile {} is unusable: {error}", path.display())]
    Pidfile { path: PathBuf, error: io::Error },
    #[error("failed to install signal handlers: {0}")]
    Signals(io::Error),
    #[error("failed to spawn a worker process: {0}")]
    Spawn(io::Error),
    #[error("failed to signal pid {pid}: {error}")]
    Signal { pid: u32, error: io::Error },
}
