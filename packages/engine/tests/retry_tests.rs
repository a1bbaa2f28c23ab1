#![allow(clippy::disallowed_methods)]

mod common;

use std::error::Error;
use std::time::Duration;

use db::DbConfig;
use engine::{EnqueueRequest, FailOutcome, JobQueue, QueueError};
use queue_core::{JobStatus, JobType, Priority, QueueKey, RetryPolicy, WorkerType};
use queue_index::{IndexConfig, QueueIndex};
use serde_json::json;

#[tokio::test]
async fn failure_with_retries_left_goes_back_to_the_queue() -> Result<(), Box<dyn Error>> {
    let queue = common::setup_queue().await?;
    let j5 = queue
        .enqueue(EnqueueRequest::new(JobType::Transcription, json!({ "file": "a.wav" })))
        .await?;
    queue
        .dequeue(WorkerType::Transcriber, "w1")
        .await?
        .expect("claimed");

    let outcome = queue.fail(j5, "boom").await?;
    assert_eq!(
        outcome,
        FailOutcome::Retrying {
            retry_count: 1,
            delay: Duration::from_millis(20),
        }
    );

    let retrying = queue.get_job(j5).await?;
    assert_eq!(retrying.status, JobStatus::Retrying);
    assert_eq!(retrying.retry_count, 1);
    assert_eq!(retrying.error_message.as_deref(), Some("boom"));
    assert!(retrying.worker_id.is_none());

    let requeued = common::wait_for_status(&queue, j5, JobStatus::Queued).await?;
    assert_eq!(requeued.status, JobStatus::Queued);
    assert_eq!(requeued.retry_count, 1);
    assert_eq!(requeued.progress, 0);

    let again = queue
        .dequeue(WorkerType::Transcriber, "w2")
        .await?
        .expect("retried job");
    assert_eq!(again.id, j5);
    assert_eq!(again.worker_id.as_deref(), Some("w2"));
    Ok(())
}

#[tokio::test]
async fn retried_job_waits_out_its_backoff() -> Result<(), Box<dyn Error>> {
    let config =
        common::test_config().with_retry_policy(RetryPolicy::new(Duration::from_millis(200)));
    let queue = JobQueue::connect(config).await?;
    let id = queue
        .enqueue(EnqueueRequest::new(JobType::Transcription, json!({})))
        .await?;
    queue
        .dequeue(WorkerType::Transcriber, "w1")
        .await?
        .expect("claimed");

    let outcome = queue.fail(id, "transient").await?;
    assert_eq!(
        outcome,
        FailOutcome::Retrying {
            retry_count: 1,
            delay: Duration::from_millis(400),
        }
    );

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(queue.get_job(id).await?.status, JobStatus::Retrying);
    assert_eq!(queue.pending_retries().await?, vec![id]);
    assert!(queue.dequeue(WorkerType::Transcriber, "w1").await?.is_none());

    let requeued = common::wait_for_status(&queue, id, JobStatus::Queued).await?;
    assert_eq!(requeued.status, JobStatus::Queued);
    assert!(queue.pending_retries().await?.is_empty());

    queue.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn exhausted_retries_fail_permanently() -> Result<(), Box<dyn Error>> {
    let queue = common::setup_queue().await?;
    let id = queue
        .enqueue(
            EnqueueRequest::new(JobType::Diarization, json!({}))
                .priority(Priority::High)
                .max_retries(1),
        )
        .await?;

    queue
        .dequeue(WorkerType::Transcriber, "w1")
        .await?
        .expect("claimed");
    assert!(matches!(queue.fail(id, "first").await?, FailOutcome::Retrying { .. }));
    common::wait_for_status(&queue, id, JobStatus::Queued).await?;

    queue
        .dequeue(WorkerType::Transcriber, "w1")
        .await?
        .expect("claimed again");
    assert_eq!(queue.fail(id, "second").await?, FailOutcome::Failed);

    let failed = queue.get_job(id).await?;
    assert_eq!(failed.status, JobStatus::Failed);
    assert_eq!(failed.retry_count, 1);
    assert!(failed.retry_count <= failed.max_retries);
    assert_eq!(failed.error_message.as_deref(), Some("second"));
    assert!(failed.completed_at.is_some());

    // Terminal: a further failure is rejected and nothing is re-enqueued.
    let again = queue.fail(id, "third").await;
    assert!(matches!(
        again,
        Err(QueueError::InvalidTransition { from: JobStatus::Failed, .. })
    ));

    tokio::time::sleep(Duration::from_millis(100)).await;
    let key = QueueKey::new(JobType::Diarization, Priority::High);
    assert_eq!(queue.queue_stats().await?.depth(key), 0);
    assert!(queue.pending_retries().await?.is_empty());
    assert_eq!(queue.get_job(id).await?.status, JobStatus::Failed);
    Ok(())
}

#[tokio::test]
async fn zero_max_retries_fails_on_first_error() -> Result<(), Box<dyn Error>> {
    let queue = common::setup_queue().await?;
    let id = queue
        .enqueue(EnqueueRequest::new(JobType::Synthesis, json!({})).max_retries(0))
        .await?;
    queue
        .dequeue(WorkerType::Synthesizer, "s1")
        .await?
        .expect("claimed");

    assert_eq!(queue.fail(id, "nope").await?, FailOutcome::Failed);
    assert_eq!(queue.get_job(id).await?.retry_count, 0);
    Ok(())
}

#[tokio::test]
async fn succeed_records_output_and_duration() -> Result<(), Box<dyn Error>> {
    let queue = common::setup_queue().await?;
    let j6 = queue
        .enqueue(EnqueueRequest::new(JobType::Synthesis, json!({ "text": "hi" })))
        .await?;
    queue
        .dequeue(WorkerType::Synthesizer, "s1")
        .await?
        .expect("claimed");
    tokio::time::sleep(Duration::from_millis(30)).await;

    let done = queue.succeed(j6, Some(json!({ "out": 1 }))).await?;
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.progress, 100);
    assert_eq!(done.output_data, Some(json!({ "out": 1 })));
    assert!(done.worker_id.is_none());

    let started = done.started_at.expect("started");
    let completed = done.completed_at.expect("completed");
    let expected = (completed - started).num_milliseconds() as f64 / 1000.0;
    let duration = done.actual_duration.expect("duration");
    assert!((duration - expected).abs() < 0.002);
    assert!(duration >= 0.03);

    let twice = queue.succeed(j6, None).await;
    assert!(matches!(
        twice,
        Err(QueueError::InvalidTransition {
            from: JobStatus::Completed,
            to: JobStatus::Completed,
            ..
        })
    ));
    Ok(())
}

#[tokio::test]
async fn callbacks_require_a_running_job() -> Result<(), Box<dyn Error>> {
    let queue = common::setup_queue().await?;
    let id = queue
        .enqueue(EnqueueRequest::new(JobType::Transcription, json!({})))
        .await?;

    assert!(matches!(
        queue.succeed(id, None).await,
        Err(QueueError::InvalidTransition { from: JobStatus::Queued, .. })
    ));
    assert!(matches!(
        queue.fail(id, "x").await,
        Err(QueueError::InvalidTransition { from: JobStatus::Queued, .. })
    ));

    let ghost = queue_core::JobId::new();
    assert!(matches!(queue.fail(ghost, "x").await, Err(QueueError::NotFound(_))));
    Ok(())
}

#[tokio::test]
async fn shutdown_cancels_timers_and_connect_rearms_them() -> Result<(), Box<dyn Error>> {
    let db = db::init(&DbConfig::memory()).await?;
    let index = QueueIndex::connect(&IndexConfig::memory()).await?;

    let slow = common::test_config().with_retry_policy(RetryPolicy::new(Duration::from_secs(60)));
    let first = JobQueue::from_parts(db.clone(), index.clone(), slow).await?;

    let id = first
        .enqueue(EnqueueRequest::new(JobType::ModelTraining, json!({})))
        .await?;
    first
        .dequeue(WorkerType::Trainer, "t1")
        .await?
        .expect("claimed");
    first.fail(id, "oom").await?;
    assert_eq!(first.pending_retries().await?, vec![id]);

    first.shutdown().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(first.get_job(id).await?.status, JobStatus::Retrying);

    let second = JobQueue::from_parts(db, index, common::test_config()).await?;
    let requeued = common::wait_for_status(&second, id, JobStatus::Queued).await?;
    assert_eq!(requeued.status, JobStatus::Queued);

    let job = second
        .dequeue(WorkerType::Trainer, "t2")
        .await?
        .expect("re-armed job");
    assert_eq!(job.id, id);
    Ok(())
}
