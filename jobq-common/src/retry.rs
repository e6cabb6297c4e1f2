use std::time::Duration;

use crate::config::QueueConfig;

/// The maximum possible backoff before a retry, keeping the delay finite
/// even for large attempt counts.
const MAX_BACKOFF: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// The retry policy used to decide whether and when a failed job runs again.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of retries after a job's first attempt.
    max_retries: u32,
    /// Base of the exponential backoff, in seconds.
    backoff_base: u32,
}

/// The fate of a job that just failed an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Make the job eligible again after the given delay.
    Reschedule(Duration),
    /// Stop retrying and move the job to the dead letter queue.
    GiveUp,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff_base: u32) -> Self {
        Self {
            max_retries,
            backoff_base,
        }
    }

    /// Decide the fate of a job whose attempt counter, including the failure
    /// being handled, is `attempts_after_failure`. Retry N is delayed by
    /// `backoff_base ^ N` seconds, capped at a week.
    pub fn decide(&self, attempts_after_failure: u32) -> RetryDecision {
        if attempts_after_failure > self.max_retries {
            return RetryDecision::GiveUp;
        }

        let delay = u64::from(self.backoff_base)
            .checked_pow(attempts_after_failure)
            .map(Duration::from_secs)
            .unwrap_or(MAX_BACKOFF);

        RetryDecision::Reschedule(delay.min(MAX_BACKOFF))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: 2,
        }
    }
}

impl From<QueueConfig> for RetryPolicy {
    fn from(config: QueueConfig) -> Self {
        Self::new(config.max_retries, config.backoff_base)
    }
}
