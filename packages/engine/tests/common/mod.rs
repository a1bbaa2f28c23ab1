#![allow(dead_code)]

use std::time::Duration;

use engine::{EngineConfig, JobQueue, QueueError};
use queue_core::{Job, JobId, JobStatus, RetryPolicy};

/// Short pop timeout and a 10 ms retry base so scans and backoffs finish fast.
pub fn test_config() -> EngineConfig {
    EngineConfig::default()
        .with_pop_timeout(Duration::from_millis(50))
        .with_retry_policy(RetryPolicy::new(Duration::from_millis(10)))
}

/// Fresh queue over an in-memory store and index; tests never share state.
pub async fn setup_queue() -> Result<JobQueue, QueueError> {
    JobQueue::connect(test_config()).await
}

/// Poll until the job reaches `status`, giving up after two seconds.
pub async fn wait_for_status(
    queue: &JobQueue,
    job_id: JobId,
    status: JobStatus,
) -> Result<Job, QueueError> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let job = queue.get_job(job_id).await?;
        if job.status == status || tokio::time::Instant::now() >= deadline {
            return Ok(job);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
