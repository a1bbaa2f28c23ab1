//! Job queue engine.
//!
//! [`JobQueue`] ties the durable job store (`db`) to the queue index
//! (`queue_index`):
//!
//! - `Dispatcher` - priority-major scan and claim for a worker type
//! - `DependencyResolver` - withholds jobs whose dependencies are not completed
//! - `RetryController` - success, failure and retry decisions
//! - `RetryScheduler` - actor holding the cancellable backoff timers
//! - `ProgressPublisher` - per-job progress channel and lifecycle events
//!
//! # Usage
//!
//! ```ignore
//! use engine::{EngineConfig, EnqueueRequest, JobQueue};
//! use queue_core::{JobType, WorkerType};
//!
//! let queue = JobQueue::connect(EngineConfig::from_env()?).await?;
//! let id = queue
//!     .enqueue(EnqueueRequest::new(JobType::Transcription, serde_json::json!({"file": "a.wav"})))
//!     .await?;
//!
//! if let Some(job) = queue.dequeue(WorkerType::Transcriber, "worker-1").await? {
//!     queue.succeed(job.id, None).await?;
//! }
//! ```

mod config;
mod dependency;
mod dispatcher;
mod error;
mod progress;
mod queue;
mod retry;
mod scheduler;

pub use config::EngineConfig;
pub use dependency::DependencyResolver;
pub use dispatcher::Dispatcher;
pub use error::QueueError;
pub use progress::ProgressPublisher;
pub use queue::{EnqueueRequest, JobQueue};
pub use retry::{FailOutcome, RetryController};
pub use scheduler::{RetryScheduler, SchedulerMessage};

pub use db::JobFilter;
