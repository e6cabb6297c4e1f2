//! The thin operations behind each subcommand. Every operation composes
//! store, config and supervisor calls and hands plain data back to the
//! caller for printing.

use jobq_common::config::QueueConfig;
use jobq_common::error::QueueError;
use jobq_common::paths::StateDir;
use jobq_common::queue::{JobCounts, JobQueue};
use jobq_worker::supervisor;
use serde::Deserialize;

use crate::error::CliError;

/// A job submission as accepted by `jobq enqueue`. Unknown fields are
/// ignored.
#[derive(Debug, Deserialize)]
pub struct Submission {
    #[serde(default)]
    pub id: Option<String>,
    pub command: String,
}

/// Worker pool liveness plus job counts, as shown by `jobq status`.
#[derive(Debug)]
pub struct StatusReport {
    pub supervisor_pid: Option<u32>,
    pub counts: JobCounts,
}

/// Parse a submission, insisting on a non-empty `command`.
pub fn parse_submission(json: &str) -> Result<Submission, CliError> {
    let submission: Submission = serde_json::from_str(json).map_err(|error| {
        QueueError::InvalidInput(format!("malformed job submission: {error}"))
    })?;

    if submission.command.is_empty() {
        return Err(QueueError::InvalidInput("command must not be empty".to_owned()).into());
    }
    Ok(submission)
}

/// Enqueue one job described by `json`, returning its id.
pub async fn enqueue(queue: &JobQueue, json: &str) -> Result<String, CliError> {
    let submission = parse_submission(json)?;
    let id = queue
        .enqueue(submission.id.as_deref(), &submission.command)
        .await?;
    Ok(id)
}

/// Combine supervisor liveness with the store's per-state totals.
pub async fn status(state_dir: &StateDir, queue: &JobQueue) -> Result<StatusReport, CliError> {
    let supervisor_pid = supervisor::running_pid(state_dir)?;
    let counts = queue.counts().await?;
    Ok(StatusReport {
        supervisor_pid,
        counts,
    })
}

/// The effective configuration: the persisted file, or defaults when none
/// has been written yet.
pub fn config_show(state_dir: &StateDir) -> Result<QueueConfig, CliError> {
    Ok(QueueConfig::load(&state_dir.config_file())?)
}

/// Validate and persist one configuration key, returning the new config.
pub fn config_set(state_dir: &StateDir, key: &str, value: &str) -> Result<QueueConfig, CliError> {
    let path = state_dir.config_file();
    let mut config = QueueConfig::load(&path)?;
    config.set(key, value)?;
    config.save(&path)?;
    Ok(config)
}
