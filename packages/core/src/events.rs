//! Event types for real-time updates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{JobId, JobStatus, JobType, Priority};

/// Notification published on a job's progress channel.
///
/// Serialized as `{"jobId", "status", "progress", "message", "timestamp"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub job_id: JobId,
    /// Status as seen by observers (see [`JobStatus::observed`]).
    pub status: JobStatus,
    pub progress: u8,
    #[serde(default)]
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn new(job_id: JobId, status: JobStatus, progress: u8, message: Option<String>) -> Self {
        Self {
            job_id,
            status: status.observed(),
            progress,
            message,
            timestamp: Utc::now(),
        }
    }
}

/// Lifecycle events emitted by the job queue for in-process observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    /// A new job was accepted and pushed to the queue index.
    JobEnqueued {
        job_id: JobId,
        job_type: JobType,
        priority: Priority,
        timestamp: DateTime<Utc>,
    },
    /// A worker claimed the job.
    JobStarted {
        job_id: JobId,
        worker_id: String,
        timestamp: DateTime<Utc>,
    },
    /// A dequeued job had unmet dependencies and went back to the tail.
    JobDeferred {
        job_id: JobId,
        timestamp: DateTime<Utc>,
    },
    /// A worker reported progress.
    JobProgress {
        job_id: JobId,
        progress: u8,
        timestamp: DateTime<Utc>,
    },
    /// A job completed successfully.
    JobCompleted {
        job_id: JobId,
        duration_secs: Option<f64>,
        timestamp: DateTime<Utc>,
    },
    /// A job attempt failed.
    JobFailed {
        job_id: JobId,
        error: String,
        retry_count: u32,
        will_retry: bool,
        timestamp: DateTime<Utc>,
    },
    /// A failed job went back to the queue after its backoff.
    JobRequeued {
        job_id: JobId,
        retry_count: u32,
        timestamp: DateTime<Utc>,
    },
}

impl JobEvent {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            JobEvent::JobEnqueued { timestamp, .. }
            | JobEvent::JobStarted { timestamp, .. }
            | JobEvent::JobDeferred { timestamp, .. }
            | JobEvent::JobProgress { timestamp, .. }
            | JobEvent::JobCompleted { timestamp, .. }
            | JobEvent::JobFailed { timestamp, .. }
            | JobEvent::JobRequeued { timestamp, .. } => *timestamp,
        }
    }

    /// Get the job ID associated with this event.
    pub fn job_id(&self) -> JobId {
        match self {
            JobEvent::JobEnqueued { job_id, .. }
            | JobEvent::JobStarted { job_id, .. }
            | JobEvent::JobDeferred { job_id, .. }
            | JobEvent::JobProgress { job_id, .. }
            | JobEvent::JobCompleted { job_id, .. }
            | JobEvent::JobFailed { job_id, .. }
            | JobEvent::JobRequeued { job_id, .. } => *job_id,
        }
    }

    /// Get a short description of this event for logging.
    pub fn description(&self) -> String {
        match self {
            JobEvent::JobEnqueued {
                job_id,
                job_type,
                priority,
                ..
            } => format!("Job {} enqueued ({}/{})", job_id, job_type, priority),
            JobEvent::JobStarted {
                job_id, worker_id, ..
            } => format!("Job {} started by {}", job_id, worker_id),
            JobEvent::JobDeferred { job_id, .. } => {
                format!("Job {} deferred on dependencies", job_id)
            }
            JobEvent::JobProgress {
                job_id, progress, ..
            } => format!("Job {} at {}%", job_id, progress),
            JobEvent::JobCompleted {
                job_id,
                duration_secs,
                ..
            } => match duration_secs {
                Some(secs) => format!("Job {} completed in {:.3}s", job_id, secs),
                None => format!("Job {} completed", job_id),
            },
            JobEvent::JobFailed {
                job_id,
                error,
                will_retry,
                ..
            } => {
                let retry = if *will_retry { " (will retry)" } else { "" };
                format!("Job {} failed: {}{}", job_id, error, retry)
            }
            JobEvent::JobRequeued {
                job_id,
                retry_count,
                ..
            } => format!("Job {} requeued (retry {})", job_id, retry_count),
        }
    }
}
