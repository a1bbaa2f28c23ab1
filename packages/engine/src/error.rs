use db::DbError;
use queue_core::{JobId, JobStatus, RoutingError, TransitionError};
use queue_index::IndexError;
use thiserror::Error;

/// Errors returned by [`JobQueue`](crate::JobQueue) operations.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Job store error: {0}")]
    Store(#[from] DbError),

    #[error("Queue index error: {0}")]
    Index(#[from] IndexError),

    #[error("Routing error: {0}")]
    Routing(#[from] RoutingError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Job {job_id} cannot move from {from} to {to}")]
    InvalidTransition {
        job_id: JobId,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Progress must be between 0 and 100, got {0}")]
    InvalidProgress(u8),

    #[error("Progress cannot go backwards: at {current}, reported {reported}")]
    ProgressRegression { current: u8, reported: u8 },

    #[error("Unknown dependency: {0}")]
    UnknownDependency(JobId),

    #[error("Retry scheduler error: {0}")]
    Scheduler(String),

    #[error("Job queue is shut down")]
    ShutDown,
}

impl QueueError {
    pub(crate) fn transition(job_id: JobId, err: TransitionError) -> Self {
        QueueError::InvalidTransition {
            job_id,
            from: err.from,
            to: err.to,
        }
    }
}
