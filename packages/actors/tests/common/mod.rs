#![allow(dead_code)]

use std::time::Duration;

use engine::{EngineConfig, JobQueue, QueueError};
use queue_core::{Job, JobId, JobStatus, RetryPolicy};

pub async fn setup_queue() -> Result<JobQueue, QueueError> {
    let config = EngineConfig::default()
        .with_pop_timeout(Duration::from_millis(20))
        .with_retry_policy(RetryPolicy::new(Duration::from_millis(5)));
    JobQueue::connect(config).await
}

/// Poll until the job reaches `status`, giving up after three seconds.
pub async fn wait_for_status(
    queue: &JobQueue,
    job_id: JobId,
    status: JobStatus,
) -> Result<Job, QueueError> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    loop {
        let job = queue.get_job(job_id).await?;
        if job.status == status || tokio::time::Instant::now() >= deadline {
            return Ok(job);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
