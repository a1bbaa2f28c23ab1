//! Completion and failure handling.

use std::time::Duration;

use chrono::Utc;
use db::JobRepository;
use queue_core::{Job, JobEvent, JobId, JobStatus, RetryPolicy};
use ractor::ActorRef;
use serde_json::Value as JsonValue;

use crate::progress::ProgressPublisher;
use crate::scheduler::SchedulerMessage;
use crate::QueueError;

/// What `fail` did with the job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    /// A retry was consumed; the job goes back to its queue after `delay`.
    Retrying { retry_count: u32, delay: Duration },
    /// Retries exhausted. Terminal.
    Failed,
}

#[derive(Debug, Clone)]
pub struct RetryController {
    repo: JobRepository,
    policy: RetryPolicy,
    scheduler: ActorRef<SchedulerMessage>,
    publisher: ProgressPublisher,
}

impl RetryController {
    pub fn new(
        repo: JobRepository,
        policy: RetryPolicy,
        scheduler: ActorRef<SchedulerMessage>,
        publisher: ProgressPublisher,
    ) -> Self {
        Self {
            repo,
            policy,
            scheduler,
            publisher,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// RUNNING -> COMPLETED. Progress is forced to 100 and the run time is
    /// recorded in seconds when the start time is known.
    pub async fn succeed(
        &self,
        job_id: JobId,
        output: Option<JsonValue>,
    ) -> Result<Job, QueueError> {
        let job = self.load(job_id).await?;
        job.status
            .transition(JobStatus::Completed)
            .map_err(|e| QueueError::transition(job_id, e))?;

        let completed_at = Utc::now();
        let duration = job
            .started_at
            .map(|started| (completed_at - started).num_milliseconds() as f64 / 1000.0);

        let Some(job) = self
            .repo
            .complete(job_id, output, completed_at, duration)
            .await?
        else {
            return Err(self.lost_race(job_id, JobStatus::Completed).await);
        };

        tracing::info!("Job {} completed in {:?}s", job_id, duration);
        self.publisher.emit(JobEvent::JobCompleted {
            job_id,
            duration_secs: duration,
            timestamp: completed_at,
        });
        self.publisher.job_changed(&job, None).await;

        Ok(job)
    }

    /// Record a failed attempt. With retries left the job goes RETRYING and a
    /// re-enqueue is scheduled after the backoff for its new retry count;
    /// otherwise it becomes FAILED.
    pub async fn fail(&self, job_id: JobId, error: &str) -> Result<FailOutcome, QueueError> {
        let job = self.load(job_id).await?;

        if job.has_retries_left() {
            job.status
                .transition(JobStatus::Retrying)
                .map_err(|e| QueueError::transition(job_id, e))?;

            if let Some(job) = self.repo.mark_retrying(job_id, error).await? {
                let delay = self.policy.delay_for(job.retry_count);
                self.schedule(&job, delay);

                tracing::info!(
                    "Job {} failed (attempt {} of {}), retrying in {:?}: {}",
                    job_id,
                    job.retry_count,
                    job.max_retries + 1,
                    delay,
                    error
                );
                self.publisher.emit(JobEvent::JobFailed {
                    job_id,
                    error: error.to_string(),
                    retry_count: job.retry_count,
                    will_retry: true,
                    timestamp: Utc::now(),
                });
                self.publisher
                    .job_changed(&job, Some(error.to_string()))
                    .await;

                return Ok(FailOutcome::Retrying {
                    retry_count: job.retry_count,
                    delay,
                });
            }
        }

        job.status
            .transition(JobStatus::Failed)
            .map_err(|e| QueueError::transition(job_id, e))?;

        let Some(job) = self.repo.mark_failed(job_id, error).await? else {
            return Err(self.lost_race(job_id, JobStatus::Failed).await);
        };

        tracing::info!("Job {} failed permanently: {}", job_id, error);
        self.publisher.emit(JobEvent::JobFailed {
            job_id,
            error: error.to_string(),
            retry_count: job.retry_count,
            will_retry: false,
            timestamp: Utc::now(),
        });
        self.publisher
            .job_changed(&job, Some(error.to_string()))
            .await;

        Ok(FailOutcome::Failed)
    }

    /// Arm the re-enqueue timer for a RETRYING job.
    pub fn schedule(&self, job: &Job, delay: Duration) {
        let message = SchedulerMessage::Schedule {
            job_id: job.id,
            key: job.queue_key(),
            delay,
        };
        if let Err(e) = self.scheduler.cast(message) {
            // The job stays RETRYING and is re-armed on the next connect.
            tracing::warn!("Retry scheduler unavailable for job {}: {}", job.id, e);
        }
    }

    async fn load(&self, job_id: JobId) -> Result<Job, QueueError> {
        self.repo
            .find(job_id)
            .await?
            .ok_or(QueueError::NotFound(job_id))
    }

    /// A guarded update matched nothing: someone else moved the job first.
    async fn lost_race(&self, job_id: JobId, to: JobStatus) -> QueueError {
        match self.load(job_id).await {
            Ok(job) => QueueError::InvalidTransition {
                job_id,
                from: job.status,
                to,
            },
            Err(e) => e,
        }
    }
}
