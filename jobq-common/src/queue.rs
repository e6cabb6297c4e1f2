//! # JobQueue
//!
//! A persistent job queue backed by a single SQLite file.

use std::fmt;
use std::future::Future;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::{debug, warn};

use crate::error::{QueueError, QueueResult};

/// How many times a statement hitting a busy database is retried before the
/// error propagates.
const BUSY_RETRY_ATTEMPTS: u32 = 5;

/// Delay before the first busy retry; doubled on each further retry, staying
/// under 100 ms in total.
const BUSY_RETRY_INITIAL: Duration = Duration::from_millis(5);

/// Enumeration of possible states for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
pub enum JobState {
    /// A job that is waiting in the queue to be picked up by a worker.
    Pending,
    /// A job that was claimed by a worker and is currently being run.
    Processing,
    /// A job whose last attempt failed and that is waiting to be retried.
    Failed,
    /// A job that was successfully completed by a worker.
    Completed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Processing => "processing",
            JobState::Failed => "failed",
            JobState::Completed => "completed",
        }
    }
}

/// Allow casting JobState from strings.
impl FromStr for JobState {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobState::Pending),
            "processing" => Ok(JobState::Processing),
            "failed" => Ok(JobState::Failed),
            "completed" => Ok(JobState::Completed),
            invalid => Err(QueueError::InvalidInput(format!(
                "{invalid} is not a valid job state"
            ))),
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A job to be executed by a worker claiming it from the queue.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Job {
    /// A unique id identifying a job.
    pub id: String,
    /// The shell command this job runs; passed verbatim to the executor.
    pub command: String,
    /// The current state of the job.
    pub state: JobState,
    /// The number of completed execution attempts.
    pub attempts: i64,
    /// The earliest time at which the job is eligible to be claimed.
    pub run_at: DateTime<Utc>,
    /// A datetime corresponding to when the job was enqueued.
    pub created_at: DateTime<Utc>,
    /// A datetime corresponding to when the job last changed state.
    pub updated_at: DateTime<Utc>,
}

/// A job whose retry budget was exhausted, retained in the dead letter queue
/// for manual inspection or retry.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DeadLetter {
    /// A unique id identifying a job.
    pub id: String,
    /// The shell command the job ran.
    pub command: String,
    /// The number of execution attempts made before giving up.
    pub attempts: i64,
    /// A datetime corresponding to when the job was given up on.
    pub failed_at: DateTime<Utc>,
    /// The diagnostic produced by the last failing attempt, if any.
    pub last_error: Option<String>,
}

/// Job totals per state plus the size of the dead letter queue.
#[derive(Debug, Clone, Copy, sqlx::FromRow)]
pub struct JobCounts {
    pub pending: i64,
    pub processing: i64,
    pub failed: i64,
    pub completed: i64,
    pub dead: i64,
}

const SCHEMA: &[&str] = &[
    r#"
CREATE TABLE IF NOT EXISTS jobs (
    id TEXT PRIMARY KEY,
    command TEXT NOT NULL,
    state TEXT NOT NULL,
    attempts INTEGER NOT NULL DEFAULT 0,
    run_at TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)
    "#,
    r#"
CREATE INDEX IF NOT EXISTS idx_jobs_eligibility ON jobs (state, run_at)
    "#,
    r#"
CREATE TABLE IF NOT EXISTS dlq (
    id TEXT PRIMARY KEY,
    command TEXT NOT NULL,
    attempts INTEGER NOT NULL,
    failed_at TEXT NOT NULL,
    last_error TEXT
)
    "#,
];

/// A queue implemented on top of two SQLite tables, `jobs` and `dlq`.
///
/// All processes of the pool open the same database file; SQLite's write
/// lock is what keeps claims exclusive.
#[derive(Clone)]
pub struct JobQueue {
    /// A connection pool used to access the SQLite database.
    pool: SqlitePool,
}

impl JobQueue {
    /// Open (creating if missing) the queue database at `path` and apply the
    /// schema. The database runs in WAL journal mode with a short busy
    /// timeout; contention beyond that is handled by the bounded retry in
    /// each operation.
    pub async fn open(path: &Path) -> QueueResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_millis(10))
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let queue = Self { pool };
        queue.init_schema().await?;

        Ok(queue)
    }

    async fn init_schema(&self) -> QueueResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Enqueue a new pending job, generating an id when the caller supplies
    /// none. Fails with `DuplicateId` if the id exists in either `jobs` or
    /// `dlq`.
    pub async fn enqueue(&self, id: Option<&str>, command: &str) -> QueueResult<String> {
        let id = match id {
            Some(id) => id.to_owned(),
            None => uuid::Uuid::now_v7().to_string(),
        };
        retry_busy(|| self.try_enqueue(&id, command)).await?;
        Ok(id)
    }

    async fn try_enqueue(&self, id: &str, command: &str) -> QueueResult<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let taken: i64 = sqlx::query_scalar(
            r#"
SELECT (SELECT COUNT(*) FROM jobs WHERE id = ?1) + (SELECT COUNT(*) FROM dlq WHERE id = ?1)
            "#,
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        if taken > 0 {
            return Err(QueueError::DuplicateId { id: id.to_owned() });
        }

        let inserted = sqlx::query(
            r#"
INSERT INTO jobs
    (id, command, state, attempts, run_at, created_at, updated_at)
VALUES
    (?1, ?2, ?3, 0, ?4, ?4, ?4)
            "#,
        )
        .bind(id)
        .bind(command)
        .bind(JobState::Pending)
        .bind(now)
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            // A concurrent enqueue may have won the race after our existence
            // check; the primary key catches it.
            Err(error) if is_unique_violation(&error) => {
                return Err(QueueError::DuplicateId { id: id.to_owned() });
            }
            Err(error) => return Err(error.into()),
        }

        tx.commit().await?;
        Ok(())
    }

    /// Claim the earliest eligible job for a worker, transitioning it to
    /// `processing`, or return `None` when nothing is eligible.
    ///
    /// The claim is a single UPDATE statement: SQLite takes the database
    /// write lock when the statement starts, so concurrent claimants
    /// serialize before the candidate row is selected and no job can be
    /// handed to two workers. The statement commits before the job is
    /// returned, so execution never holds a store transaction open.
    pub async fn fetch_and_claim(&self, worker_tag: &str) -> QueueResult<Option<Job>> {
        let claimed = retry_busy(|| self.try_fetch_and_claim()).await?;
        if let Some(job) = &claimed {
            debug!(worker = worker_tag, job = %job.id, "claimed job");
        }
        Ok(claimed)
    }

    async fn try_fetch_and_claim(&self) -> QueueResult<Option<Job>> {
        let now = Utc::now();

        let claimed: Option<Job> = sqlx::query_as(
            r#"
UPDATE jobs
SET
    state = 'processing',
    updated_at = ?1
WHERE id = (
    SELECT id
    FROM jobs
    WHERE state IN ('pending', 'failed') AND run_at <= ?1
    ORDER BY run_at, created_at, id
    LIMIT 1
)
RETURNING id, command, state, attempts, run_at, created_at, updated_at
            "#,
        )
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(claimed)
    }

    /// Transition a claimed job to `completed`. A job that is not in
    /// `processing` is left untouched and logged, as that indicates a bug in
    /// the caller.
    pub async fn complete(&self, id: &str) -> QueueResult<()> {
        let done = retry_busy(|| async {
            let result = sqlx::query(
                r#"
UPDATE jobs
SET state = 'completed', updated_at = ?1
WHERE id = ?2 AND state = 'processing'
                "#,
            )
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected())
        })
        .await?;

        if done == 0 {
            warn!(job = id, "complete called for a job that is not processing");
        }
        Ok(())
    }

    /// Count the attempt that just failed and make the job eligible again
    /// after `delay`.
    pub async fn reschedule(&self, id: &str, delay: Duration) -> QueueResult<()> {
        // The policy clamps delays to days, far below what chrono can hold.
        let delay = chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::days(7));
        let done = retry_busy(|| async {
            let now = Utc::now();
            let result = sqlx::query(
                r#"
UPDATE jobs
SET state = 'failed', attempts = attempts + 1, run_at = ?1, updated_at = ?2
WHERE id = ?3 AND state = 'processing'
                "#,
            )
            .bind(now + delay)
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;
            Ok(result.rows_affected())
        })
        .await?;

        if done == 0 {
            warn!(job = id, "reschedule called for a job that is not processing");
        }
        Ok(())
    }

    /// Count the attempt that just failed, remove the job from `jobs` and
    /// record it in the dead letter queue, all in one transaction.
    pub async fn give_up(&self, id: &str, last_error: Option<&str>) -> QueueResult<()> {
        retry_busy(|| self.try_give_up(id, last_error)).await
    }

    async fn try_give_up(&self, id: &str, last_error: Option<&str>) -> QueueResult<()> {
        let mut tx = self.pool.begin().await?;

        let job: Option<Job> = sqlx::query_as(
            r#"
SELECT id, command, state, attempts, run_at, created_at, updated_at
FROM jobs
WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(job) = job else {
            warn!(job = id, "give_up called for an unknown job");
            return Ok(());
        };

        sqlx::query(
            r#"
INSERT INTO dlq
    (id, command, attempts, failed_at, last_error)
VALUES
    (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&job.id)
        .bind(&job.command)
        .bind(job.attempts + 1)
        .bind(Utc::now())
        .bind(last_error)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM jobs WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Snapshot of jobs, newest change first, optionally restricted to one
    /// state.
    pub async fn list(&self, state: Option<JobState>) -> QueueResult<Vec<Job>> {
        retry_busy(|| async {
            let jobs = match state {
                Some(state) => {
                    sqlx::query_as(
                        r#"
SELECT id, command, state, attempts, run_at, created_at, updated_at
FROM jobs
WHERE state = ?1
ORDER BY updated_at DESC
                        "#,
                    )
                    .bind(state)
                    .fetch_all(&self.pool)
                    .await?
                }
                None => {
                    sqlx::query_as(
                        r#"
SELECT id, command, state, attempts, run_at, created_at, updated_at
FROM jobs
ORDER BY updated_at DESC
                        "#,
                    )
                    .fetch_all(&self.pool)
                    .await?
                }
            };
            Ok(jobs)
        })
        .await
    }

    /// Snapshot of the dead letter queue, newest failure first.
    pub async fn dlq_list(&self) -> QueueResult<Vec<DeadLetter>> {
        retry_busy(|| async {
            let entries = sqlx::query_as(
                r#"
SELECT id, command, attempts, failed_at, last_error
FROM dlq
ORDER BY failed_at DESC
                "#,
            )
            .fetch_all(&self.pool)
            .await?;
            Ok(entries)
        })
        .await
    }

    /// Move a dead-lettered job back into `jobs` as a fresh pending job with
    /// a zeroed attempt counter. Fails with `NotFound` if the id is not in
    /// the dead letter queue.
    pub async fn dlq_retry(&self, id: &str) -> QueueResult<()> {
        retry_busy(|| self.try_dlq_retry(id)).await
    }

    async fn try_dlq_retry(&self, id: &str) -> QueueResult<()> {
        let mut tx = self.pool.begin().await?;

        let dead: Option<DeadLetter> = sqlx::query_as(
            r#"
SELECT id, command, attempts, failed_at, last_error
FROM dlq
WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(dead) = dead else {
            return Err(QueueError::NotFound { id: id.to_owned() });
        };

        sqlx::query(
            r#"
INSERT INTO jobs
    (id, command, state, attempts, run_at, created_at, updated_at)
VALUES
    (?1, ?2, ?3, 0, ?4, ?4, ?4)
            "#,
        )
        .bind(&dead.id)
        .bind(&dead.command)
        .bind(JobState::Pending)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM dlq WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Job totals per state plus the dead letter count, read in one
    /// statement.
    pub async fn counts(&self) -> QueueResult<JobCounts> {
        retry_busy(|| async {
            let counts = sqlx::query_as(
                r#"
SELECT
    COUNT(*) FILTER (WHERE state = 'pending') AS pending,
    COUNT(*) FILTER (WHERE state = 'processing') AS processing,
    COUNT(*) FILTER (WHERE state = 'failed') AS failed,
    COUNT(*) FILTER (WHERE state = 'completed') AS completed,
    (SELECT COUNT(*) FROM dlq) AS dead
FROM jobs
                "#,
            )
            .fetch_one(&self.pool)
            .await?;
            Ok(counts)
        })
        .await
    }
}

/// Run `op`, retrying a bounded number of times when SQLite reports the
/// database as busy or locked. Any other error propagates immediately.
async fn retry_busy<T, F, Fut>(mut op: F) -> QueueResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = QueueResult<T>>,
{
    let mut delay = BUSY_RETRY_INITIAL;
    for attempt in 1..BUSY_RETRY_ATTEMPTS {
        match op().await {
            Err(QueueError::Storage(error)) if is_busy(&error) => {
                debug!(%error, attempt, "store is busy, retrying");
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            other => return other,
        }
    }
    op().await
}

/// SQLITE_BUSY, SQLITE_LOCKED and SQLITE_BUSY_SNAPSHOT.
/// See: https://www.sqlite.org/rescode.html.
fn is_busy(error: &sqlx::Error) -> bool {
    error
        .as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == "5" || code == "6" || code == "517")
}

/// SQLITE_CONSTRAINT_PRIMARYKEY and SQLITE_CONSTRAINT_UNIQUE.
fn is_unique_violation(error: &sqlx::Error) -> bool {
    error
        .as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == "1555" || code == "2067")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    async fn test_queue() -> (tempfile::TempDir, JobQueue) {
        let dir = tempfile::tempdir().expect("failed to create a temporary directory");
        let queue = JobQueue::open(&dir.path().join("queue.db"))
            .await
            .expect("failed to open the test queue");
        (dir, queue)
    }

    #[tokio::test]
    async fn test_enqueue_generates_an_id_when_none_is_given() {
        let (_dir, queue) = test_queue().await;

        let id = queue
            .enqueue(None, "true")
            .await
            .expect("failed to enqueue job");

        assert!(!id.is_empty());
        let jobs = queue.list(None).await.expect("failed to list jobs");
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, id);
        assert_eq!(jobs[0].state, JobState::Pending);
        assert_eq!(jobs[0].attempts, 0);
    }

    #[tokio::test]
    async fn test_enqueue_rejects_a_duplicate_id() {
        let (_dir, queue) = test_queue().await;

        queue
            .enqueue(Some("dup"), "true")
            .await
            .expect("failed to enqueue job");
        let error = queue
            .enqueue(Some("dup"), "echo other")
            .await
            .expect_err("duplicate enqueue should fail");

        assert!(matches!(error, QueueError::DuplicateId { id } if id == "dup"));
        let jobs = queue.list(None).await.expect("failed to list jobs");
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].command, "true");
    }

    #[tokio::test]
    async fn test_enqueue_rejects_an_id_parked_in_the_dlq() {
        let (_dir, queue) = test_queue().await;

        queue
            .enqueue(Some("jf"), "false")
            .await
            .expect("failed to enqueue job");
        queue
            .fetch_and_claim("worker-0")
            .await
            .expect("failed to claim job")
            .expect("a job should be eligible");
        queue
            .give_up("jf", Some("exited with status 1"))
            .await
            .expect("failed to give up on job");

        let error = queue
            .enqueue(Some("jf"), "false")
            .await
            .expect_err("enqueue over a dead-lettered id should fail");
        assert!(matches!(error, QueueError::DuplicateId { .. }));
    }

    #[tokio::test]
    async fn test_fetch_and_claim_returns_none_on_an_empty_queue() {
        let (_dir, queue) = test_queue().await;

        let claimed = queue
            .fetch_and_claim("worker-0")
            .await
            .expect("failed to poll the queue");
        assert!(claimed.is_none());
    }

    #[tokio::test]
    async fn test_fetch_and_claim_takes_the_earliest_job() {
        let (_dir, queue) = test_queue().await;

        queue
            .enqueue(Some("j1"), "true")
            .await
            .expect("failed to enqueue job");
        queue
            .enqueue(Some("j2"), "true")
            .await
            .expect("failed to enqueue job");

        let job = queue
            .fetch_and_claim("worker-0")
            .await
            .expect("failed to claim job")
            .expect("a job should be eligible");

        assert_eq!(job.id, "j1");
        assert_eq!(job.state, JobState::Processing);
        assert_eq!(job.attempts, 0);
    }

    #[tokio::test]
    async fn test_a_processing_job_cannot_be_claimed_again() {
        let (_dir, queue) = test_queue().await;

        queue
            .enqueue(Some("j1"), "true")
            .await
            .expect("failed to enqueue job");
        queue
            .fetch_and_claim("worker-0")
            .await
            .expect("failed to claim job")
            .expect("a job should be eligible");

        let second = queue
            .fetch_and_claim("worker-1")
            .await
            .expect("failed to poll the queue");
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn test_a_rescheduled_job_is_not_eligible_before_run_at() {
        let (_dir, queue) = test_queue().await;

        queue
            .enqueue(Some("j1"), "false")
            .await
            .expect("failed to enqueue job");
        queue
            .fetch_and_claim("worker-0")
            .await
            .expect("failed to claim job")
            .expect("a job should be eligible");
        queue
            .reschedule("j1", Duration::from_secs(3600))
            .await
            .expect("failed to reschedule job");

        let claimed = queue
            .fetch_and_claim("worker-0")
            .await
            .expect("failed to poll the queue");
        assert!(claimed.is_none());

        let jobs = queue.list(Some(JobState::Failed)).await.expect("failed to list jobs");
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].attempts, 1);
        assert!(jobs[0].run_at > Utc::now());
    }

    #[tokio::test]
    async fn test_a_due_failed_job_is_claimed_again_and_attempts_grow() {
        let (_dir, queue) = test_queue().await;

        queue
            .enqueue(Some("j1"), "false")
            .await
            .expect("failed to enqueue job");

        for expected_attempts in 1..=3 {
            let job = queue
                .fetch_and_claim("worker-0")
                .await
                .expect("failed to claim job")
                .expect("the job should be eligible again");
            assert_eq!(job.attempts, expected_attempts - 1);

            queue
                .reschedule("j1", Duration::ZERO)
                .await
                .expect("failed to reschedule job");

            let jobs = queue.list(None).await.expect("failed to list jobs");
            assert_eq!(jobs[0].attempts, expected_attempts);
        }
    }

    #[tokio::test]
    async fn test_complete_marks_a_claimed_job_completed() {
        let (_dir, queue) = test_queue().await;

        queue
            .enqueue(Some("j1"), "true")
            .await
            .expect("failed to enqueue job");
        queue
            .fetch_and_claim("worker-0")
            .await
            .expect("failed to claim job")
            .expect("a job should be eligible");
        queue.complete("j1").await.expect("failed to complete job");

        let jobs = queue
            .list(Some(JobState::Completed))
            .await
            .expect("failed to list jobs");
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, "j1");
        assert_eq!(jobs[0].attempts, 0);

        // Completed jobs are never eligible again.
        let claimed = queue
            .fetch_and_claim("worker-0")
            .await
            .expect("failed to poll the queue");
        assert!(claimed.is_none());
    }

    #[tokio::test]
    async fn test_complete_outside_processing_is_a_noop() {
        let (_dir, queue) = test_queue().await;

        queue
            .enqueue(Some("j1"), "true")
            .await
            .expect("failed to enqueue job");
        queue.complete("j1").await.expect("complete should not error");

        let jobs = queue.list(None).await.expect("failed to list jobs");
        assert_eq!(jobs[0].state, JobState::Pending);
    }

    #[tokio::test]
    async fn test_give_up_moves_the_job_to_the_dlq() {
        let (_dir, queue) = test_queue().await;

        queue
            .enqueue(Some("jf"), "false")
            .await
            .expect("failed to enqueue job");
        queue
            .fetch_and_claim("worker-0")
            .await
            .expect("failed to claim job")
            .expect("a job should be eligible");
        queue
            .give_up("jf", Some("exited with status 1"))
            .await
            .expect("failed to give up on job");

        let jobs = queue.list(None).await.expect("failed to list jobs");
        assert!(jobs.is_empty());

        let dead = queue.dlq_list().await.expect("failed to list the dlq");
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].id, "jf");
        assert_eq!(dead[0].attempts, 1);
        assert_eq!(dead[0].last_error.as_deref(), Some("exited with status 1"));
    }

    #[tokio::test]
    async fn test_dlq_retry_requeues_a_fresh_pending_job() {
        let (_dir, queue) = test_queue().await;

        queue
            .enqueue(Some("jf"), "false")
            .await
            .expect("failed to enqueue job");
        queue
            .fetch_and_claim("worker-0")
            .await
            .expect("failed to claim job")
            .expect("a job should be eligible");
        queue
            .give_up("jf", None)
            .await
            .expect("failed to give up on job");

        queue.dlq_retry("jf").await.expect("failed to retry from the dlq");

        let dead = queue.dlq_list().await.expect("failed to list the dlq");
        assert!(dead.is_empty());

        let jobs = queue.list(None).await.expect("failed to list jobs");
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, "jf");
        assert_eq!(jobs[0].state, JobState::Pending);
        assert_eq!(jobs[0].attempts, 0);
        assert!(jobs[0].run_at <= Utc::now());
    }

    #[tokio::test]
    async fn test_dlq_retry_of_an_unknown_id_is_not_found() {
        let (_dir, queue) = test_queue().await;

        let error = queue
            .dlq_retry("missing")
            .await
            .expect_err("retrying an unknown id should fail");
        assert!(matches!(error, QueueError::NotFound { id } if id == "missing"));
    }

    #[tokio::test]
    async fn test_counts_aggregates_all_states() {
        let (_dir, queue) = test_queue().await;

        for id in ["a", "b", "c", "d"] {
            queue
                .enqueue(Some(id), "true")
                .await
                .expect("failed to enqueue job");
        }
        queue
            .fetch_and_claim("worker-0")
            .await
            .expect("failed to claim job")
            .expect("a job should be eligible");
        queue.complete("a").await.expect("failed to complete job");
        queue
            .fetch_and_claim("worker-0")
            .await
            .expect("failed to claim job")
            .expect("a job should be eligible");
        queue
            .reschedule("b", Duration::from_secs(60))
            .await
            .expect("failed to reschedule job");
        queue
            .fetch_and_claim("worker-0")
            .await
            .expect("failed to claim job")
            .expect("a job should be eligible");
        queue
            .give_up("c", Some("boom"))
            .await
            .expect("failed to give up on job");

        let counts = queue.counts().await.expect("failed to read counts");
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.processing, 0);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.dead, 1);
    }

    #[tokio::test]
    async fn test_concurrent_claims_are_exclusive() {
        let (_dir, queue) = test_queue().await;

        for i in 0..10 {
            queue
                .enqueue(Some(&format!("j{i:02}")), "true")
                .await
                .expect("failed to enqueue job");
        }

        let mut handles = Vec::new();
        for worker in 0..4 {
            let queue = queue.clone();
            handles.push(tokio::spawn(async move {
                let tag = format!("worker-{worker}");
                let mut claimed = Vec::new();
                while let Some(job) = queue
                    .fetch_and_claim(&tag)
                    .await
                    .expect("failed to claim job")
                {
                    claimed.push(job.id);
                }
                claimed
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.await.expect("claimer task panicked") {
                assert!(seen.insert(id), "a job was claimed by two workers");
            }
        }
        assert_eq!(seen.len(), 10);
    }
}
