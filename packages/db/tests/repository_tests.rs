#![allow(clippy::disallowed_methods)]

mod common;

use queue_core::{Job, JobStatus, JobType, Priority};
use serde_json::{Value, json};
use std::error::Error;

use db::{DbError, JobFilter};

fn payload_with_message(message: &str) -> Value {
    json!({ "msg": message })
}

#[tokio::test]
async fn create_and_read_round_trips_every_field() -> Result<(), Box<dyn Error>> {
    let repo = common::setup_repo().await?;

    let dependency = Job::new(JobType::Transcription, payload_with_message("dep"));
    repo.create(&dependency).await?;

    let job = Job::new(JobType::Diarization, json!({ "audio": "s3://a.wav", "speakers": [1, 2] }))
        .with_priority(Priority::Urgent)
        .with_max_retries(5)
        .with_dependencies([dependency.id]);
    let created = repo.create(&job).await?;
    assert_eq!(created.id, job.id);

    let loaded = repo.get(job.id).await?;
    assert_eq!(loaded.job_type, JobType::Diarization);
    assert_eq!(loaded.priority, Priority::Urgent);
    assert_eq!(loaded.status, JobStatus::Queued);
    assert_eq!(loaded.max_retries, 5);
    assert_eq!(loaded.dependencies, vec![dependency.id]);
    assert_eq!(loaded.input_data["speakers"], json!([1, 2]));
    assert!(loaded.worker_id.is_none());

    let duplicate = repo.create(&job).await;
    assert!(duplicate.is_err());

    let missing = repo.get(queue_core::JobId::new()).await;
    assert!(matches!(missing, Err(DbError::NotFound(_))));

    Ok(())
}

#[tokio::test]
async fn claim_only_succeeds_once() -> Result<(), Box<dyn Error>> {
    let repo = common::setup_repo().await?;
    let job = Job::new(JobType::Synthesis, payload_with_message("hi"));
    repo.create(&job).await?;

    let claimed = repo.claim(job.id, "worker-1").await?.expect("first claim wins");
    assert_eq!(claimed.status, JobStatus::Running);
    assert_eq!(claimed.worker_id.as_deref(), Some("worker-1"));
    assert!(claimed.started_at.is_some());

    let second = repo.claim(job.id, "worker-2").await?;
    assert!(second.is_none());

    let stored = repo.get(job.id).await?;
    assert_eq!(stored.worker_id.as_deref(), Some("worker-1"));

    Ok(())
}

#[tokio::test]
async fn guarded_transitions_follow_the_lifecycle() -> Result<(), Box<dyn Error>> {
    let repo = common::setup_repo().await?;
    let job = Job::new(JobType::ModelTraining, payload_with_message("train")).with_max_retries(1);
    repo.create(&job).await?;

    // Nothing but claim applies to a queued job.
    assert!(repo.mark_retrying(job.id, "early").await?.is_none());
    assert!(repo.mark_failed(job.id, "early").await?.is_none());
    assert!(repo.update_progress(job.id, 10).await?.is_none());

    repo.claim(job.id, "worker-1").await?.expect("claimed");
    let progressed = repo.update_progress(job.id, 40).await?.expect("progress stored");
    assert_eq!(progressed.progress, 40);
    assert!(repo.update_progress(job.id, 20).await?.is_none());

    let retrying = repo.mark_retrying(job.id, "oom").await?.expect("retry allowed");
    assert_eq!(retrying.status, JobStatus::Retrying);
    assert_eq!(retrying.retry_count, 1);
    assert_eq!(retrying.progress, 0);
    assert_eq!(retrying.error_message.as_deref(), Some("oom"));
    assert!(retrying.worker_id.is_none());

    let requeued = repo.requeue(job.id).await?.expect("requeued");
    assert_eq!(requeued.status, JobStatus::Queued);
    assert!(repo.requeue(job.id).await?.is_none());

    repo.claim(job.id, "worker-2").await?.expect("claimed again");
    // Retry budget is spent now.
    assert!(repo.mark_retrying(job.id, "oom again").await?.is_none());

    let failed = repo.mark_failed(job.id, "oom again").await?.expect("failed");
    assert_eq!(failed.status, JobStatus::Failed);
    assert!(failed.completed_at.is_some());
    assert!(repo.mark_failed(job.id, "again").await?.is_none());

    Ok(())
}

#[tokio::test]
async fn complete_stores_output_and_duration() -> Result<(), Box<dyn Error>> {
    let repo = common::setup_repo().await?;
    let job = Job::new(JobType::Transcription, payload_with_message("t"));
    repo.create(&job).await?;

    let running = repo.claim(job.id, "worker-1").await?.expect("claimed");
    let started_at = running.started_at.expect("start stamped");
    let completed_at = started_at + chrono::Duration::milliseconds(1500);

    let completed = repo
        .complete(job.id, Some(json!({ "out": 1 })), completed_at, Some(1.5))
        .await?
        .expect("completed");

    assert_eq!(completed.status, JobStatus::Completed);
    assert_eq!(completed.progress, 100);
    assert_eq!(completed.output_data, Some(json!({ "out": 1 })));
    assert_eq!(completed.actual_duration, Some(1.5));
    assert_eq!(completed.completed_at, Some(completed_at));
    assert!(completed.worker_id.is_none());

    assert!(repo.complete(job.id, None, completed_at, None).await?.is_none());

    Ok(())
}

#[tokio::test]
async fn list_filters_and_counts() -> Result<(), Box<dyn Error>> {
    let repo = common::setup_repo().await?;

    let queued = Job::new(JobType::Synthesis, payload_with_message("q"));
    let running = Job::new(JobType::Synthesis, payload_with_message("r"));
    let other = Job::new(JobType::Diarization, payload_with_message("d"));
    for job in [&queued, &running, &other] {
        repo.create(job).await?;
    }
    repo.claim(running.id, "worker-1").await?;

    let synthesis = repo
        .list(JobFilter {
            job_type: Some(JobType::Synthesis),
            ..Default::default()
        })
        .await?;
    assert_eq!(synthesis.len(), 2);

    let queued_only = repo
        .list(JobFilter {
            status: Some(JobStatus::Queued),
            ..Default::default()
        })
        .await?;
    assert!(queued_only.iter().all(|j| j.status == JobStatus::Queued));
    assert_eq!(queued_only.len(), 2);

    let limited = repo
        .list(JobFilter {
            limit: Some(1),
            ..Default::default()
        })
        .await?;
    assert_eq!(limited.len(), 1);

    let counts = repo.count_by_status().await?;
    assert_eq!(counts.get(&JobStatus::Queued).copied().unwrap_or(0), 2);
    assert_eq!(counts.get(&JobStatus::Running).copied().unwrap_or(0), 1);

    Ok(())
}
