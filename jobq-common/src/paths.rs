//! Per-user state directory layout: the queue database, the configuration
//! file and the supervisor pidfile all live under one directory.

use std::path::{Path, PathBuf};

use crate::error::{QueueError, QueueResult};

/// Environment variable overriding the state directory location. The
/// supervisor sets it on spawned workers so the whole pool shares one store.
pub const STATE_DIR_ENV: &str = "JOBQ_STATE_DIR";

const QUEUE_DB: &str = "queue.db";
const CONFIG_FILE: &str = "config.json";
const PIDFILE: &str = "worker.pid";

#[derive(Debug, Clone)]
pub struct StateDir {
    root: PathBuf,
}

impl StateDir {
    /// Resolve the state directory from `$JOBQ_STATE_DIR`, falling back to
    /// the platform's per-user data directory.
    pub fn from_env() -> QueueResult<Self> {
        if let Some(root) = std::env::var_os(STATE_DIR_ENV) {
            return Ok(Self { root: root.into() });
        }

        let base = dirs::data_local_dir().ok_or_else(|| {
            QueueError::InvalidInput(format!(
                "could not determine a per-user state directory; set {STATE_DIR_ENV}"
            ))
        })?;
        Ok(Self {
            root: base.join("jobq"),
        })
    }

    /// Use an explicit directory instead of resolving one.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the directory if it does not exist yet.
    pub fn ensure(&self) -> QueueResult<()> {
        std::fs::create_dir_all(&self.root)?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn queue_db(&self) -> PathBuf {
        self.root.join(QUEUE_DB)
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    pub fn pidfile(&self) -> PathBuf {
        self.root.join(PIDFILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_names_are_stable() {
        let state = StateDir::at("/tmp/jobq-test");

        assert_eq!(state.queue_db(), PathBuf::from("/tmp/jobq-test/queue.db"));
        assert_eq!(
            state.config_file(),
            PathBuf::from("/tmp/jobq-test/config.json")
        );
        assert_eq!(state.pidfile(), PathBuf::from("/tmp/jobq-test/worker.pid"));
    }

    #[test]
    fn test_ensure_creates_nested_directories() {
        let dir = tempfile::tempdir().expect("failed to create a temporary directory");
        let state = StateDir::at(dir.path().join("nested/state"));

        state.ensure().expect("failed to create the state directory");
        assert!(state.root().is_dir());
    }
}
