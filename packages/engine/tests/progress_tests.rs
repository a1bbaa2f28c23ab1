#![allow(clippy::disallowed_methods)]

mod common;

use std::error::Error;
use std::time::Duration;

use engine::{EnqueueRequest, QueueError};
use futures_util::StreamExt;
use queue_core::{JobEvent, JobStatus, JobType, WorkerType};
use serde_json::json;

#[tokio::test]
async fn progress_reaches_subscribers() -> Result<(), Box<dyn Error>> {
    let queue = common::setup_queue().await?;
    let id = queue
        .enqueue(EnqueueRequest::new(JobType::Transcription, json!({})))
        .await?;
    queue
        .dequeue(WorkerType::Transcriber, "w1")
        .await?
        .expect("claimed");

    let mut events = queue.subscribe_progress(id).await?;

    let job = queue.report_progress(id, 40, Some("halfway".into())).await?;
    assert_eq!(job.progress, 40);

    let event = tokio::time::timeout(Duration::from_secs(1), events.next())
        .await?
        .expect("progress event");
    assert_eq!(event.job_id, id);
    assert_eq!(event.progress, 40);
    assert_eq!(event.status, JobStatus::Running);
    assert_eq!(event.message.as_deref(), Some("halfway"));

    queue.succeed(id, None).await?;
    let event = tokio::time::timeout(Duration::from_secs(1), events.next())
        .await?
        .expect("completion event");
    assert_eq!(event.status, JobStatus::Completed);
    assert_eq!(event.progress, 100);
    Ok(())
}

#[tokio::test]
async fn retrying_is_shown_as_running() -> Result<(), Box<dyn Error>> {
    let queue = common::setup_queue().await?;
    let id = queue
        .enqueue(EnqueueRequest::new(JobType::Synthesis, json!({})))
        .await?;
    queue
        .dequeue(WorkerType::Synthesizer, "s1")
        .await?
        .expect("claimed");

    let mut events = queue.subscribe_progress(id).await?;
    queue.fail(id, "flaky").await?;

    let event = tokio::time::timeout(Duration::from_secs(1), events.next())
        .await?
        .expect("failure event");
    assert_eq!(event.status, JobStatus::Running);
    assert_eq!(event.message.as_deref(), Some("flaky"));
    Ok(())
}

#[tokio::test]
async fn progress_is_validated() -> Result<(), Box<dyn Error>> {
    let queue = common::setup_queue().await?;
    let id = queue
        .enqueue(EnqueueRequest::new(JobType::Diarization, json!({})))
        .await?;

    assert!(matches!(
        queue.report_progress(id, 10, None).await,
        Err(QueueError::InvalidTransition { from: JobStatus::Queued, .. })
    ));

    queue
        .dequeue(WorkerType::Transcriber, "w1")
        .await?
        .expect("claimed");

    assert!(matches!(
        queue.report_progress(id, 101, None).await,
        Err(QueueError::InvalidProgress(101))
    ));

    queue.report_progress(id, 60, None).await?;
    queue.report_progress(id, 60, None).await?;
    assert!(matches!(
        queue.report_progress(id, 20, None).await,
        Err(QueueError::ProgressRegression { current: 60, reported: 20 })
    ));
    assert_eq!(queue.get_job(id).await?.progress, 60);
    Ok(())
}

#[tokio::test]
async fn lifecycle_events_are_broadcast() -> Result<(), Box<dyn Error>> {
    let queue = common::setup_queue().await?;
    let mut events = queue.subscribe_events();

    let id = queue
        .enqueue(EnqueueRequest::new(JobType::ModelTraining, json!({})))
        .await?;
    queue
        .dequeue(WorkerType::Trainer, "t1")
        .await?
        .expect("claimed");
    queue.report_progress(id, 50, None).await?;
    queue.succeed(id, None).await?;

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        assert_eq!(event.job_id(), id);
        seen.push(event);
    }

    assert!(matches!(seen[0], JobEvent::JobEnqueued { job_type: JobType::ModelTraining, .. }));
    assert!(matches!(&seen[1], JobEvent::JobStarted { worker_id, .. } if worker_id == "t1"));
    assert!(matches!(seen[2], JobEvent::JobProgress { progress: 50, .. }));
    assert!(matches!(seen[3], JobEvent::JobCompleted { duration_secs: Some(_), .. }));
    assert_eq!(seen.len(), 4);
    Ok(())
}
