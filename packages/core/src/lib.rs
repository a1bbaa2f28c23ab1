//! Core domain types for the job queue system.
//!
//! This crate contains shared types used across all packages:
//! - Job, JobStatus and the lifecycle state machine
//! - JobType, Priority and the typed queue index key
//! - WorkerType and the static routing table
//! - Retry backoff policy
//! - Events for real-time updates

mod events;
mod job;
mod queue;
mod retry;
mod routing;

pub use events::{JobEvent, ProgressEvent};
pub use job::{Job, JobId, JobStatus, JobType, ParseEnumError, Priority, TransitionError};
pub use queue::{QueueDepth, QueueKey, QueueStats};
pub use retry::RetryPolicy;
pub use routing::{RoutingError, RoutingTable, WorkerType};
