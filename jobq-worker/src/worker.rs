//! The worker loop: claim a job, execute it, drive it to a terminal
//! transition, repeat until asked to stop.

use std::time::Duration;

use jobq_common::queue::{Job, JobQueue};
use jobq_common::retry::{RetryDecision, RetryPolicy};
use tokio::sync::watch;
use tracing::{error, info, warn, Instrument};

use crate::error::WorkerError;
use crate::executor::{self, Outcome};

/// How long a worker sleeps when the queue has no eligible job.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// A worker that repeatedly claims and executes jobs until signalled to
/// stop. Workers share nothing with their siblings; coordination happens
/// only through the store and the stop flag.
pub struct Worker {
    /// The queue jobs are claimed from.
    queue: JobQueue,
    /// The policy deciding the fate of failed jobs.
    retry_policy: RetryPolicy,
    /// Index of this worker in the pool. Used for log prefixing only, never
    /// persisted.
    index: usize,
    /// The interval to sleep when the queue is empty.
    poll_interval: Duration,
    /// Flips to true when this process is asked to stop.
    shutdown: watch::Receiver<bool>,
}

impl Worker {
    pub fn new(
        queue: JobQueue,
        retry_policy: RetryPolicy,
        index: usize,
        poll_interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            queue,
            retry_policy,
            index,
            poll_interval,
            shutdown,
        }
    }

    /// Run until the stop flag is observed or the store becomes unusable.
    /// An in-progress job is always driven to a terminal transition before
    /// the loop exits; the flag is only checked between iterations.
    pub async fn run(mut self) -> Result<(), WorkerError> {
        let span = tracing::info_span!("worker", index = self.index);
        async move {
            info!("worker started");
            let tag = format!("worker-{}", self.index);

            loop {
                if *self.shutdown.borrow() {
                    break;
                }

                match self.queue.fetch_and_claim(&tag).await {
                    Ok(Some(job)) => self.process_job(job).await?,
                    Ok(None) => self.idle().await,
                    Err(error) => {
                        error!(%error, "queue is unusable, shutting this worker down");
                        return Err(error.into());
                    }
                }
            }

            info!("worker stopped");
            Ok(())
        }
        .instrument(span)
        .await
    }

    /// Sleep for one poll interval, waking early if the stop flag flips.
    async fn idle(&mut self) {
        tokio::select! {
            _ = tokio::time::sleep(self.poll_interval) => {},
            _ = self.shutdown.changed() => {},
        }
    }

    /// Execute one claimed job and route the outcome: success completes the
    /// job, failure consults the retry policy. Executor anomalies are
    /// already folded into `Outcome::Failure`, so a single bad job can never
    /// take the worker down; only store errors propagate.
    async fn process_job(&self, job: Job) -> Result<(), WorkerError> {
        info!(job = %job.id, command = %job.command, "executing job");

        match executor::execute(&job.command).await {
            Outcome::Success => {
                self.queue.complete(&job.id).await?;
                metrics::counter!("jobq_jobs_completed").increment(1);
                info!(job = %job.id, "job completed");
            }
            Outcome::Failure(reason) => {
                let attempts_after_failure =
                    u32::try_from(job.attempts).unwrap_or(u32::MAX).saturating_add(1);

                match self.retry_policy.decide(attempts_after_failure) {
                    RetryDecision::Reschedule(delay) => {
                        self.queue.reschedule(&job.id, delay).await?;
                        metrics::counter!("jobq_jobs_retried").increment(1);
                        warn!(job = %job.id, %reason, retry_in = ?delay, "job failed, rescheduled");
                    }
                    RetryDecision::GiveUp => {
                        self.queue.give_up(&job.id, Some(&reason)).await?;
                        metrics::counter!("jobq_jobs_dead_lettered").increment(1);
                        error!(job = %job.id, %reason, "job failed, moved to the dead letter queue");
                    }
                }
            }
        }

        Ok(())
    }
}
