//! Spawns, signals and joins the pool of worker processes.
//!
//! The supervisor owns the pidfile for the lifetime of the pool. Workers
//! are separate OS processes running the hidden `worker run` subcommand of
//! the current executable; a termination signal to the supervisor is
//! relayed to every child, whose own handler flips its stop flag.

use std::path::Path;

use jobq_common::config::QueueConfig;
use jobq_common::paths::{StateDir, STATE_DIR_ENV};
use tokio::process::{Child, Command};
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};

use crate::error::SupervisorError;

/// Supervises a pool of worker processes sharing one queue.
pub struct Supervisor {
    state_dir: StateDir,
    config: QueueConfig,
    count: usize,
}

impl Supervisor {
    pub fn new(state_dir: StateDir, config: QueueConfig, count: usize) -> Self {
        Self {
            state_dir,
            config,
            count,
        }
    }

    /// Run the pool in the foreground until every worker has exited. The
    /// pidfile is written before the first spawn and removed after the last
    /// join, whatever the outcome.
    pub async fn run(&self) -> Result<(), SupervisorError> {
        let pidfile = self.state_dir.pidfile();
        acquire_pidfile(&pidfile)?;
        info!(pid = std::process::id(), workers = self.count, "supervisor started");

        let result = self.run_pool().await;

        if let Err(error) = std::fs::remove_file(&pidfile) {
            warn!(%error, "failed to remove the pidfile");
        }
        result
    }

    async fn run_pool(&self) -> Result<(), SupervisorError> {
        // Handlers are installed before the first spawn so no signal window
        // is left open while children exist.
        let mut term = signal(SignalKind::terminate()).map_err(SupervisorError::Signals)?;
        let mut interrupt = signal(SignalKind::interrupt()).map_err(SupervisorError::Signals)?;

        let exe = std::env::current_exe().map_err(SupervisorError::Spawn)?;

        let mut children: Vec<(usize, Child)> = Vec::with_capacity(self.count);
        let mut last_spawn_error = None;
        for index in 0..self.count {
            match self.spawn_worker(&exe, index) {
                Ok(child) => {
                    info!(worker = index, pid = child.id(), "spawned worker");
                    children.push((index, child));
                }
                Err(error) => {
                    error!(worker = index, %error, "failed to spawn worker");
                    last_spawn_error = Some(error);
                }
            }
        }

        if children.is_empty() {
            let error = last_spawn_error
                .unwrap_or_else(|| std::io::Error::other("no workers requested"));
            return Err(SupervisorError::Spawn(error));
        }

        let pids: Vec<u32> = children.iter().filter_map(|(_, child)| child.id()).collect();

        // Join children one at a time while still relaying any further
        // termination signal to the whole pool. Re-sending SIGTERM to a
        // worker that already observed it is harmless.
        for (index, mut child) in children {
            loop {
                tokio::select! {
                    status = child.wait() => {
                        match status {
                            Ok(status) => info!(worker = index, %status, "worker exited"),
                            Err(error) => warn!(worker = index, %error, "failed to wait for worker"),
                        }
                        break;
                    }
                    _ = term.recv() => relay_stop(&pids),
                    _ = interrupt.recv() => relay_stop(&pids),
                }
            }
        }

        info!("all workers joined");
        Ok(())
    }

    fn spawn_worker(&self, exe: &Path, index: usize) -> std::io::Result<Child> {
        Command::new(exe)
            .arg("worker")
            .arg("run")
            .arg("--index")
            .arg(index.to_string())
            .arg("--max-retries")
            .arg(self.config.max_retries.to_string())
            .arg("--backoff-base")
            .arg(self.config.backoff_base.to_string())
            .env(STATE_DIR_ENV, self.state_dir.root())
            .spawn()
    }
}

/// Ask every worker to stop by delivering SIGTERM.
fn relay_stop(pids: &[u32]) {
    info!("stopping workers");
    for &pid in pids {
        if let Err(error) = send_signal(pid, libc::SIGTERM) {
            warn!(pid, %error, "failed to signal worker");
        }
    }
}

/// Signal the running supervisor to stop, returning its pid. Returns
/// immediately without waiting for the pool to wind down.
pub fn stop(state_dir: &StateDir) -> Result<u32, SupervisorError> {
    let path = state_dir.pidfile();
    let Some(pid) = read_pidfile(&path)? else {
        return Err(SupervisorError::NotRunning);
    };

    match send_signal(pid, libc::SIGTERM) {
        Ok(()) => Ok(pid),
        Err(error) if error.raw_os_error() == Some(libc::ESRCH) => {
            Err(SupervisorError::NotRunning)
        }
        Err(error) => Err(SupervisorError::Signal { pid, error }),
    }
}

/// The pid of a live supervisor, if one is running.
pub fn running_pid(state_dir: &StateDir) -> Result<Option<u32>, SupervisorError> {
    match read_pidfile(&state_dir.pidfile())? {
        Some(pid) if pid_alive(pid) => Ok(Some(pid)),
        _ => Ok(None),
    }
}

/// Write our pid, refusing when the pidfile names a live process. A stale
/// pidfile left behind by a crashed supervisor is replaced.
fn acquire_pidfile(path: &Path) -> Result<(), SupervisorError> {
    if let Some(pid) = read_pidfile(path)? {
        if pid_alive(pid) {
            return Err(SupervisorError::AlreadyRunning { pid });
        }
        warn!(pid, "replacing a stale pidfile");
    }

    std::fs::write(path, format!("{}\n", std::process::id())).map_err(|error| {
        SupervisorError::Pidfile {
            path: path.to_owned(),
            error,
        }
    })
}

/// Read the supervisor pid; `None` when the pidfile is absent.
fn read_pidfile(path: &Path) -> Result<Option<u32>, SupervisorError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(error) => {
            return Err(SupervisorError::Pidfile {
                path: path.to_owned(),
                error,
            })
        }
    };

    let pid = contents.trim().parse::<u32>().map_err(|_| {
        pidfile_error(path, "pidfile does not contain a pid")
    })?;
    Ok(Some(pid))
}

fn pidfile_error(path: &Path, message: &str) -> SupervisorError {
    SupervisorError::Pidfile {
        path: path.to_owned(),
        error: std::io::Error::new(std::io::ErrorKind::InvalidData, message.to_owned()),
    }
}

/// Check whether `pid` names a live process.
fn pid_alive(pid: u32) -> bool {
    send_signal(pid, 0).is_ok()
}

/// Deliver `signal` to `pid`. The only unsafe code in the workspace;
/// kill(2) takes no pointers.
#[allow(unsafe_code)]
fn send_signal(pid: u32, signal: libc::c_int) -> std::io::Result<()> {
    let rc = unsafe { libc::kill(pid as libc::pid_t, signal) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}
