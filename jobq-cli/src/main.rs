//! Command line entry point for the jobq queue.
//!
//! Also hosts the hidden `worker run` subcommand: the supervisor re-invokes
//! this executable once per worker so each runs in its own OS process.

use clap::{Parser, Subcommand};
use jobq_common::config::QueueConfig;
use jobq_common::error::QueueError;
use jobq_common::paths::StateDir;
use jobq_common::queue::{JobQueue, JobState};
use jobq_common::retry::RetryPolicy;
use jobq_worker::shutdown;
use jobq_worker::supervisor::{self, Supervisor};
use jobq_worker::worker::{Worker, POLL_INTERVAL};

mod error;
mod ops;

use error::CliError;

#[derive(Parser)]
#[command(name = "jobq", about = "A local, persistent background job queue", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enqueue a job: a JSON object with `command` and an optional `id`.
    Enqueue {
        /// The submission, or `-` to read it from stdin.
        json: String,
    },
    /// Show worker pool liveness and job counts by state.
    Status,
    /// List jobs, newest change first.
    List {
        /// Restrict to one of pending, processing, failed or completed.
        #[arg(long)]
        state: Option<JobState>,
    },
    /// Inspect or retry dead-lettered jobs.
    Dlq {
        #[command(subcommand)]
        command: DlqCommands,
    },
    /// Show or change the persisted configuration.
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Control the worker pool.
    Worker {
        #[command(subcommand)]
        command: WorkerCommands,
    },
}

#[derive(Subcommand)]
enum DlqCommands {
    /// List dead-lettered jobs, newest failure first.
    List,
    /// Move a dead-lettered job back into the queue as a fresh pending job.
    Retry { id: String },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the effective configuration as JSON.
    Show,
    /// Set `max_retries` or `backoff_base`.
    Set { key: String, value: String },
}

#[derive(Subcommand)]
enum WorkerCommands {
    /// Run a supervisor with a pool of workers in the foreground.
    Start {
        /// How many worker processes to spawn.
        #[arg(long, default_value_t = 1)]
        count: usize,
    },
    /// Signal the running supervisor to stop gracefully.
    Stop,
    /// Run one worker process. Spawned by `worker start`.
    #[command(hide = true)]
    Run {
        #[arg(long)]
        index: usize,
        #[arg(long)]
        max_retries: u32,
        #[arg(long)]
        backoff_base: u32,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    if let Err(error) = run(cli.command).await {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

async fn run(command: Commands) -> Result<(), CliError> {
    let state_dir = StateDir::from_env()?;
    state_dir.ensure()?;

    match command {
        Commands::Enqueue { json } => {
            let json = if json == "-" {
                std::io::read_to_string(std::io::stdin())?
            } else {
                json
            };
            let queue = JobQueue::open(&state_dir.queue_db()).await?;
            let id = ops::enqueue(&queue, &json).await?;
            println!("{id}");
        }
        Commands::Status => {
            let queue = JobQueue::open(&state_dir.queue_db()).await?;
            let report = ops::status(&state_dir, &queue).await?;
            match report.supervisor_pid {
                Some(pid) => println!("worker: running (pid {pid})"),
                None => println!("worker: stopped"),
            }
            println!("pending: {}", report.counts.pending);
            println!("processing: {}", report.counts.processing);
            println!("failed: {}", report.counts.failed);
            println!("completed: {}", report.counts.completed);
            println!("dead: {}", report.counts.dead);
        }
        Commands::List { state } => {
            let queue = JobQueue::open(&state_dir.queue_db()).await?;
            for job in queue.list(state).await? {
                println!(
                    "{}  {:<10}  {:>3}  {}  {}",
                    job.id,
                    job.state,
                    job.attempts,
                    job.updated_at.to_rfc3339(),
                    job.command
                );
            }
        }
        Commands::Dlq { command } => {
            let queue = JobQueue::open(&state_dir.queue_db()).await?;
            match command {
                DlqCommands::List => {
                    for entry in queue.dlq_list().await? {
                        println!(
                            "{}  {:>3}  {}  {}",
                            entry.id,
                            entry.attempts,
                            entry.failed_at.to_rfc3339(),
                            entry.command
                        );
                    }
                }
                DlqCommands::Retry { id } => {
                    queue.dlq_retry(&id).await?;
                    println!("requeued {id}");
                }
            }
        }
        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                let config = ops::config_show(&state_dir)?;
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
            ConfigCommands::Set { key, value } => {
                ops::config_set(&state_dir, &key, &value)?;
                println!("{key} = {value}");
            }
        },
        Commands::Worker { command } => match command {
            WorkerCommands::Start { count } => {
                if count == 0 {
                    return Err(
                        QueueError::InvalidInput("--count must be at least 1".to_owned()).into(),
                    );
                }
                let config = QueueConfig::load(&state_dir.config_file())?;
                Supervisor::new(state_dir.clone(), config, count).run().await?;
            }
            WorkerCommands::Stop => {
                let pid = supervisor::stop(&state_dir)?;
                println!("sent stop signal to supervisor (pid {pid})");
            }
            WorkerCommands::Run {
                index,
                max_retries,
                backoff_base,
            } => {
                let queue = JobQueue::open(&state_dir.queue_db()).await?;
                let shutdown = shutdown::latch()?;
                let worker = Worker::new(
                    queue,
                    RetryPolicy::new(max_retries, backoff_base),
                    index,
                    POLL_INTERVAL,
                    shutdown,
                );
                worker.run().await?;
            }
        },
    }

    Ok(())
}
