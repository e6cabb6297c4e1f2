use thiserror::Error;

/// Enumeration of errors for operations on the job queue and its
/// configuration.
/// Errors that can originate from sqlx are wrapped by us to provide
/// additional context.
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("a job with id {id} already exists")]
    DuplicateId { id: String },
    #[error("no job with id {id}")]
    NotFound { id: String },
    #[error("configuration file access failed with: {0}")]
    ConfigIo(#[from] std::io::Error),
    #[error("storage failed with: {0}")]
    Storage(#[from] sqlx::Error),
}

pub type QueueResult<T> = std::result::Result<T, QueueError>;
