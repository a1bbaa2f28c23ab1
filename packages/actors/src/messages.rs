//! Message types for actor communication.

use engine::QueueError;
use queue_core::WorkerType;
use ractor::RpcReplyPort;

/// Messages for the WorkerActor.
#[derive(Debug)]
pub enum WorkerMessage {
    /// Try to claim and run one job.
    Poll,

    /// Stop polling and shut the worker down.
    Shutdown,
}

/// Messages for the WorkerPool.
#[derive(Debug)]
pub enum PoolMessage {
    /// Snapshot of the pool.
    Status { reply: RpcReplyPort<PoolStatus> },

    /// Stop every worker, then the pool.
    Shutdown,
}

/// One live worker in a pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerInfo {
    pub worker_id: String,
    pub worker_type: WorkerType,
}

/// Pool snapshot returned by [`PoolMessage::Status`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStatus {
    pub workers: Vec<WorkerInfo>,
    /// Workers restarted after a failure since the pool started.
    pub restarts: u64,
}

impl PoolStatus {
    pub fn count(&self, worker_type: WorkerType) -> usize {
        self.workers
            .iter()
            .filter(|w| w.worker_type == worker_type)
            .count()
    }
}

/// Error type for the worker runtime.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Invalid worker configuration: {0}")]
    Config(String),

    #[error("Worker type {0} is not routed by the job queue")]
    Unrouted(WorkerType),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}
