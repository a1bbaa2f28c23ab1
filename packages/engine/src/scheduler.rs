//! Retry scheduler actor.
//!
//! Owns one timer per job waiting out its backoff. When a timer fires the job
//! moves RETRYING -> QUEUED and its id goes back on the queue index. Stopping
//! the actor aborts every pending timer; those jobs stay RETRYING in the store
//! and are picked up again by the next `JobQueue::connect`.
//!
//! Requeue and push are two writes to two backends. If the push fails after
//! the store moved the job to QUEUED, the job is logged and left unindexed;
//! nothing re-arms it, since only RETRYING jobs are re-armed on connect.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use db::JobRepository;
use queue_core::{JobEvent, JobId, QueueKey};
use queue_index::QueueIndex;
use ractor::concurrency::JoinHandle;
use ractor::{Actor, ActorProcessingErr, ActorRef, MessagingErr, RpcReplyPort};

use crate::progress::ProgressPublisher;

/// Messages for the [`RetryScheduler`].
#[derive(Debug)]
pub enum SchedulerMessage {
    /// Re-enqueue `job_id` onto `key` after `delay`. Replaces any timer
    /// already pending for the job.
    Schedule {
        job_id: JobId,
        key: QueueKey,
        delay: Duration,
    },

    /// A backoff elapsed.
    Fire { job_id: JobId, key: QueueKey },

    /// Jobs with a pending timer.
    Pending { reply: RpcReplyPort<Vec<JobId>> },
}

pub struct RetrySchedulerArgs {
    pub repo: JobRepository,
    pub index: QueueIndex,
    pub publisher: ProgressPublisher,
}

pub struct RetrySchedulerState {
    repo: JobRepository,
    index: QueueIndex,
    publisher: ProgressPublisher,
    timers: HashMap<JobId, JoinHandle<Result<(), MessagingErr<SchedulerMessage>>>>,
}

impl RetrySchedulerState {
    async fn fire(&mut self, job_id: JobId, key: QueueKey) {
        self.timers.remove(&job_id);

        let job = match self.repo.requeue(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                tracing::debug!("Job {} is no longer retrying, skipping requeue", job_id);
                return;
            }
            Err(e) => {
                tracing::warn!("Failed to requeue job {}: {}", job_id, e);
                return;
            }
        };

        if let Err(e) = self.index.push(key, job_id).await {
            tracing::warn!("Job {} is QUEUED but could not be pushed to {}: {}", job_id, key, e);
            return;
        }

        tracing::info!("Job {} requeued for retry {}", job_id, job.retry_count);
        self.publisher.emit(JobEvent::JobRequeued {
            job_id,
            retry_count: job.retry_count,
            timestamp: Utc::now(),
        });
        self.publisher.job_changed(&job, None).await;
    }
}

/// Actor that re-enqueues failed jobs after their backoff delay.
pub struct RetryScheduler;

impl Actor for RetryScheduler {
    type Msg = SchedulerMessage;
    type State = RetrySchedulerState;
    type Arguments = RetrySchedulerArgs;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting retry scheduler");

        Ok(RetrySchedulerState {
            repo: args.repo,
            index: args.index,
            publisher: args.publisher,
            timers: HashMap::new(),
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SchedulerMessage::Schedule { job_id, key, delay } => {
                tracing::debug!("Retrying job {} in {:?}", job_id, delay);
                let timer =
                    myself.send_after(delay, move || SchedulerMessage::Fire { job_id, key });
                if let Some(previous) = state.timers.insert(job_id, timer) {
                    previous.abort();
                }
            }

            SchedulerMessage::Fire { job_id, key } => {
                state.fire(job_id, key).await;
            }

            SchedulerMessage::Pending { reply } => {
                let _ = reply.send(state.timers.keys().copied().collect());
            }
        }

        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        let pending = state.timers.len();
        for (_, timer) in state.timers.drain() {
            timer.abort();
        }
        tracing::info!("Retry scheduler stopped, cancelled {} pending retries", pending);
        Ok(())
    }
}
