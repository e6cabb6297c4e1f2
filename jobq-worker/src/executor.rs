//! Runs one job's command as a child process.

use std::process::Stdio;

use tokio::process::Command;

/// The classified result of executing a job command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The command exited with status 0.
    Success,
    /// The command could not be run or exited unsuccessfully.
    Failure(String),
}

/// Execute `command` through the platform shell and wait for it to finish,
/// so pipes and redirects work. The child inherits the worker's stdout and
/// stderr; nothing is captured. Stdin is closed so a command reading from it
/// cannot hang the worker forever.
pub async fn execute(command: &str) -> Outcome {
    let child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn();

    let mut child = match child {
        Ok(child) => child,
        Err(error) => return Outcome::Failure(format!("failed to spawn: {error}")),
    };

    match child.wait().await {
        Ok(status) if status.success() => Outcome::Success,
        Ok(status) => match status.code() {
            Some(code) => Outcome::Failure(format!("exited with status {code}")),
            None => Outcome::Failure("terminated by signal".to_owned()),
        },
        Err(error) => Outcome::Failure(format!("failed to wait for child: {error}")),
    }
}
