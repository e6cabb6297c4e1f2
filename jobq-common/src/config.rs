//! Persisted queue configuration.
//!
//! Two knobs, stored as JSON in the state directory. The supervisor reads
//! them once at start and hands them to workers at spawn time; changes take
//! effect on the next `worker start`.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{QueueError, QueueResult};

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BACKOFF_BASE: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum number of retries after a job's first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base of the exponential retry backoff, in seconds.
    #[serde(default = "default_backoff_base")]
    pub backoff_base: u32,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_backoff_base() -> u32 {
    DEFAULT_BACKOFF_BASE
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base: DEFAULT_BACKOFF_BASE,
        }
    }
}

impl QueueConfig {
    /// Load the configuration from `path`, falling back to defaults when the
    /// file does not exist yet.
    pub fn load(path: &Path) -> QueueResult<Self> {
        match std::fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|error| {
                QueueError::InvalidInput(format!("malformed configuration file: {error}"))
            }),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(error) => Err(error.into()),
        }
    }

    /// Persist the configuration to `path` as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> QueueResult<()> {
        let body = serde_json::to_vec_pretty(self).map_err(|error| {
            QueueError::InvalidInput(format!("failed to encode configuration: {error}"))
        })?;
        std::fs::write(path, body)?;
        Ok(())
    }

    /// Set one recognized key from its string representation.
    pub fn set(&mut self, key: &str, value: &str) -> QueueResult<()> {
        if !matches!(key, "max_retries" | "backoff_base") {
            return Err(QueueError::InvalidInput(format!(
                "unrecognized config key {key:?}"
            )));
        }

        let parsed = value.parse::<u32>().map_err(|_| {
            QueueError::InvalidInput(format!(
                "{key} must be a non-negative integer, got {value:?}"
            ))
        })?;

        match key {
            "max_retries" => self.max_retries = parsed,
            _ => {
                if parsed == 0 {
                    return Err(QueueError::InvalidInput(
                        "backoff_base must be at least 1".to_owned(),
                    ));
                }
                self.backoff_base = parsed;
            }
        }
        Ok(())
    }
}
