//! The job queue service object.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use db::{Database, JobFilter, JobRepository};
use futures_util::stream::BoxStream;
use queue_core::{
    Job, JobEvent, JobId, JobStatus, JobType, Priority, ProgressEvent, QueueKey, QueueStats,
    RoutingTable, WorkerType,
};
use queue_index::QueueIndex;
use ractor::concurrency::JoinHandle;
use ractor::{Actor, ActorRef};
use serde_json::Value as JsonValue;
use tokio::sync::{Mutex, broadcast};

use crate::dispatcher::Dispatcher;
use crate::progress::ProgressPublisher;
use crate::retry::{FailOutcome, RetryController};
use crate::scheduler::{RetryScheduler, RetrySchedulerArgs, SchedulerMessage};
use crate::{EngineConfig, QueueError};

/// A job submission.
#[derive(Debug, Clone)]
pub struct EnqueueRequest {
    pub job_type: JobType,
    pub input_data: JsonValue,
    /// Defaults to NORMAL.
    pub priority: Option<Priority>,
    pub dependencies: Vec<JobId>,
    /// Defaults to [`Job::DEFAULT_MAX_RETRIES`].
    pub max_retries: Option<u32>,
}

impl EnqueueRequest {
    pub fn new(job_type: JobType, input_data: JsonValue) -> Self {
        Self {
            job_type,
            input_data,
            priority: None,
            dependencies: Vec::new(),
            max_retries: None,
        }
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn depends_on(mut self, dependencies: impl IntoIterator<Item = JobId>) -> Self {
        self.dependencies.extend(dependencies);
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

struct Inner {
    repo: JobRepository,
    index: QueueIndex,
    routing: RoutingTable,
    dispatcher: Dispatcher,
    retry: RetryController,
    publisher: ProgressPublisher,
    scheduler: ActorRef<SchedulerMessage>,
    scheduler_handle: Mutex<Option<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

/// Durable, priority-ordered job queue with dependency gating and retry with
/// backoff.
///
/// Cheap to clone; all clones share one connection and one retry scheduler.
/// Every operation goes through the job store and the queue index, so several
/// processes pointed at the same backends cooperate without a coordinator.
#[derive(Clone)]
pub struct JobQueue {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue")
            .field("prefix", &self.inner.index.prefix())
            .field("shut_down", &self.inner.shut_down.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl JobQueue {
    /// Connect to the configured job store and queue index, start the retry
    /// scheduler and re-arm jobs left waiting for a retry.
    pub async fn connect(config: EngineConfig) -> Result<Self, QueueError> {
        let db = db::init(&config.db).await?;
        let index = QueueIndex::connect(&config.index).await?;

        Self::from_parts(db, index, config).await
    }

    /// Build a queue over already connected backends.
    pub async fn from_parts(
        db: Database,
        index: QueueIndex,
        config: EngineConfig,
    ) -> Result<Self, QueueError> {
        config.routing.validate()?;

        let repo = JobRepository::new(db);
        let publisher = ProgressPublisher::new(index.clone(), config.event_capacity);

        let args = RetrySchedulerArgs {
            repo: repo.clone(),
            index: index.clone(),
            publisher: publisher.clone(),
        };
        let (scheduler, handle) = Actor::spawn(None, RetryScheduler, args)
            .await
            .map_err(|e| QueueError::Scheduler(format!("Failed to spawn retry scheduler: {}", e)))?;

        let dispatcher = Dispatcher::new(
            repo.clone(),
            index.clone(),
            publisher.clone(),
            config.routing.clone(),
            config.pop_timeout,
        );
        let retry = RetryController::new(
            repo.clone(),
            config.retry,
            scheduler.clone(),
            publisher.clone(),
        );

        let queue = Self {
            inner: Arc::new(Inner {
                repo,
                index,
                routing: config.routing,
                dispatcher,
                retry,
                publisher,
                scheduler,
                scheduler_handle: Mutex::new(Some(handle)),
                shut_down: AtomicBool::new(false),
            }),
        };

        if let Err(e) = queue.rearm_retries().await {
            queue.shutdown().await;
            return Err(e);
        }
        tracing::info!("Job queue ready");

        Ok(queue)
    }

    async fn rearm_retries(&self) -> Result<(), QueueError> {
        let waiting = self
            .inner
            .repo
            .list(JobFilter {
                status: Some(JobStatus::Retrying),
                ..Default::default()
            })
            .await?;

        if waiting.is_empty() {
            return Ok(());
        }

        tracing::info!("Re-arming {} jobs waiting for retry", waiting.len());
        let policy = self.inner.retry.policy();
        for job in &waiting {
            self.inner
                .retry
                .schedule(job, policy.delay_for(job.retry_count));
        }

        Ok(())
    }

    fn ensure_running(&self) -> Result<(), QueueError> {
        if self.inner.shut_down.load(Ordering::SeqCst) {
            Err(QueueError::ShutDown)
        } else {
            Ok(())
        }
    }

    pub fn routing(&self) -> &RoutingTable {
        &self.inner.routing
    }

    /// Submit a job: persist its record, then make it visible on the index.
    pub async fn enqueue(&self, request: EnqueueRequest) -> Result<JobId, QueueError> {
        self.ensure_running()?;

        let job = Job::new(request.job_type, request.input_data)
            .with_priority(request.priority.unwrap_or_default())
            .with_max_retries(request.max_retries.unwrap_or(Job::DEFAULT_MAX_RETRIES))
            .with_dependencies(request.dependencies);

        for dependency in &job.dependencies {
            if self.inner.repo.find(*dependency).await?.is_none() {
                return Err(QueueError::UnknownDependency(*dependency));
            }
        }

        let job = self.inner.repo.create(&job).await?;
        self.inner.index.push(job.queue_key(), job.id).await?;

        tracing::info!(
            "Job {} enqueued ({}/{}, {} dependencies)",
            job.id,
            job.job_type,
            job.priority,
            job.dependencies.len()
        );
        self.inner.publisher.emit(JobEvent::JobEnqueued {
            job_id: job.id,
            job_type: job.job_type,
            priority: job.priority,
            timestamp: job.created_at,
        });

        Ok(job.id)
    }

    /// Claim the highest-priority eligible job for this worker type. `None`
    /// after one full scan; callers poll again after their own backoff.
    pub async fn dequeue(
        &self,
        worker_type: WorkerType,
        worker_id: &str,
    ) -> Result<Option<Job>, QueueError> {
        self.ensure_running()?;
        self.inner.dispatcher.dequeue(worker_type, worker_id).await
    }

    /// Store a new progress value for a running job and notify its observers.
    pub async fn report_progress(
        &self,
        job_id: JobId,
        progress: u8,
        message: Option<String>,
    ) -> Result<Job, QueueError> {
        if progress > 100 {
            return Err(QueueError::InvalidProgress(progress));
        }

        let job = self.get_job(job_id).await?;
        check_progress(&job, progress)?;

        let job = match self.inner.repo.update_progress(job_id, progress).await? {
            Some(job) => job,
            None => {
                // Moved on between the read and the guarded write.
                let current = self.get_job(job_id).await?;
                check_progress(&current, progress)?;
                return Err(QueueError::InvalidTransition {
                    job_id,
                    from: current.status,
                    to: JobStatus::Running,
                });
            }
        };

        self.inner.publisher.emit(JobEvent::JobProgress {
            job_id,
            progress,
            timestamp: Utc::now(),
        });
        self.inner
            .publisher
            .publish(ProgressEvent::new(job_id, job.status, progress, message))
            .await;

        Ok(job)
    }

    pub async fn succeed(
        &self,
        job_id: JobId,
        output: Option<JsonValue>,
    ) -> Result<Job, QueueError> {
        self.inner.retry.succeed(job_id, output).await
    }

    pub async fn fail(&self, job_id: JobId, error: &str) -> Result<FailOutcome, QueueError> {
        self.inner.retry.fail(job_id, error).await
    }

    /// Depth of every `(job type, priority)` queue.
    pub async fn queue_stats(&self) -> Result<QueueStats, QueueError> {
        let mut stats = QueueStats::default();
        for key in QueueKey::all() {
            stats.push(key, self.inner.index.length(key).await?);
        }
        Ok(stats)
    }

    /// Progress events for one job from now on. No replay.
    pub async fn subscribe_progress(
        &self,
        job_id: JobId,
    ) -> Result<BoxStream<'static, ProgressEvent>, QueueError> {
        Ok(self.inner.publisher.subscribe(job_id).await?)
    }

    /// Lifecycle events for every job handled by this process.
    pub fn subscribe_events(&self) -> broadcast::Receiver<JobEvent> {
        self.inner.publisher.subscribe_events()
    }

    pub async fn get_job(&self, job_id: JobId) -> Result<Job, QueueError> {
        self.inner
            .repo
            .find(job_id)
            .await?
            .ok_or(QueueError::NotFound(job_id))
    }

    pub async fn list_jobs(&self, filter: JobFilter) -> Result<Vec<Job>, QueueError> {
        Ok(self.inner.repo.list(filter).await?)
    }

    /// Jobs whose retry timer is armed in this process.
    pub async fn pending_retries(&self) -> Result<Vec<JobId>, QueueError> {
        let result = ractor::rpc::call(
            &self.inner.scheduler,
            |reply| SchedulerMessage::Pending { reply },
            None,
        )
        .await
        .map_err(|e| QueueError::Scheduler(e.to_string()))?;

        match result {
            ractor::rpc::CallResult::Success(pending) => Ok(pending),
            _ => Err(QueueError::Scheduler("No reply from retry scheduler".into())),
        }
    }

    /// Stop the retry scheduler, cancelling pending timers, and refuse further
    /// enqueue and dequeue calls. Jobs left RETRYING are re-armed by the next
    /// `connect`. Idempotent.
    pub async fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }

        tracing::info!("Shutting down job queue");
        self.inner.scheduler.stop(Some("job queue shutdown".into()));

        if let Some(handle) = self.inner.scheduler_handle.lock().await.take()
            && let Err(e) = handle.await
        {
            tracing::warn!("Retry scheduler did not stop cleanly: {}", e);
        }
    }
}

fn check_progress(job: &Job, progress: u8) -> Result<(), QueueError> {
    if job.status != JobStatus::Running {
        return Err(QueueError::InvalidTransition {
            job_id: job.id,
            from: job.status,
            to: JobStatus::Running,
        });
    }
    if progress < job.progress {
        return Err(QueueError::ProgressRegression {
            current: job.progress,
            reported: progress,
        });
    }
    Ok(())
}
