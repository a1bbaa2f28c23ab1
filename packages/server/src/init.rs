//! Server initialization for the job queue system.

use std::time::Duration;

use actors::{
    ActorRef, FnHandler, HandlerFuture, JobContext, JobHandlerRegistry, PoolConfig, PoolMessage,
    start_pool,
};
use engine::{EngineConfig, JobQueue};
use queue_core::{Job, JobEvent, JobType};
use tokio::task::JoinHandle;

/// Interval between queue depth log lines.
const STATS_INTERVAL: Duration = Duration::from_secs(30);

/// Everything started by [`start`].
pub struct Runtime {
    queue: JobQueue,
    pool: ActorRef<PoolMessage>,
    pool_handle: JoinHandle<()>,
    background: Vec<JoinHandle<()>>,
}

impl Runtime {
    /// Stop the worker pool first so no job is claimed after the queue closes.
    pub async fn shutdown(self) {
        if self.pool.send_message(PoolMessage::Shutdown).is_ok()
            && let Err(e) = self.pool_handle.await
        {
            tracing::warn!("Worker pool did not stop cleanly: {}", e);
        }

        self.queue.shutdown().await;

        for task in self.background {
            task.abort();
        }
        tracing::info!("Job queue system stopped");
    }
}

/// Initialize the job queue system.
///
/// Reads `JOBQ_*` configuration, connects the queue and starts the worker pool
/// (`JOBQ_WORKERS`, e.g. `transcriber=2,trainer=1`; one worker per type when
/// unset).
pub async fn start() -> Result<Runtime, Box<dyn std::error::Error>> {
    tracing::info!("Initializing job queue system...");

    let config = EngineConfig::from_env()?;
    let queue = JobQueue::connect(config).await?;

    let pool_config = match std::env::var("JOBQ_WORKERS") {
        Ok(workers) => PoolConfig::parse(&workers)?,
        Err(_) => PoolConfig::default(),
    };

    let (pool, pool_handle) = start_pool(queue.clone(), demo_handlers(), pool_config).await?;

    let background = vec![log_events(&queue), log_stats(&queue)];

    tracing::info!("Job queue system initialized");
    Ok(Runtime {
        queue,
        pool,
        pool_handle,
        background,
    })
}

/// Demo handlers, one per job type.
fn demo_handlers() -> JobHandlerRegistry {
    let mut handlers = JobHandlerRegistry::new();

    // Transcription: pretend to work through the file in steps
    handlers.register(FnHandler::new(
        JobType::Transcription,
        |job: Job, ctx: JobContext| -> HandlerFuture {
            let seconds = job
                .input_data
                .get("seconds")
                .and_then(|v| v.as_u64())
                .unwrap_or(2);
            Box::pin(async move {
                for step in 1..=4u8 {
                    tokio::time::sleep(Duration::from_millis(seconds * 250)).await;
                    ctx.report_progress(step * 25, Some(format!("chunk {} of 4", step)))
                        .await
                        .map_err(|e| e.to_string())?;
                }
                Ok(Some(serde_json::json!({ "transcript": "", "source": job.input_data })))
            })
        },
    ));

    // Diarization: echo
    handlers.register(FnHandler::new(
        JobType::Diarization,
        |job: Job, _ctx: JobContext| -> HandlerFuture {
            Box::pin(async move {
                tracing::info!("Diarization job: {:?}", job.input_data);
                Ok(Some(job.input_data))
            })
        },
    ));

    // Model training: slow, reports progress every second
    handlers.register(FnHandler::new(
        JobType::ModelTraining,
        |job: Job, ctx: JobContext| -> HandlerFuture {
            let epochs = job
                .input_data
                .get("epochs")
                .and_then(|v| v.as_u64())
                .unwrap_or(5)
                .clamp(1, 100);
            Box::pin(async move {
                for epoch in 1..=epochs {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    let progress = (epoch * 100 / epochs) as u8;
                    ctx.report_progress(progress, Some(format!("epoch {}", epoch)))
                        .await
                        .map_err(|e| e.to_string())?;
                }
                Ok(Some(serde_json::json!({ "epochs": epochs })))
            })
        },
    ));

    // Synthesis: fails on request (for testing retries)
    handlers.register(FnHandler::new(
        JobType::Synthesis,
        |job: Job, _ctx: JobContext| -> HandlerFuture {
            let should_fail = job
                .input_data
                .get("fail")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            Box::pin(async move {
                if should_fail {
                    Err("Intentional failure".into())
                } else {
                    Ok(Some(serde_json::json!({ "audio": format!("{}.wav", job.id) })))
                }
            })
        },
    ));

    handlers
}

/// Log every lifecycle event as one JSON line.
fn log_events(queue: &JobQueue) -> JoinHandle<()> {
    let mut events = queue.subscribe_events();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => tracing::info!(target: "jobq::events", "{}", format_event(&event)),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Event log lagged, skipped {} events", skipped);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

fn format_event(event: &JobEvent) -> String {
    serde_json::to_string(event).unwrap_or_else(|_| event.description())
}

/// Periodically log queue depths.
fn log_stats(queue: &JobQueue) -> JoinHandle<()> {
    let queue = queue.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(STATS_INTERVAL);
        loop {
            interval.tick().await;
            match queue.queue_stats().await {
                Ok(stats) => tracing::info!("Queued jobs: {}", stats.total()),
                Err(e) => tracing::warn!("Failed to read queue stats: {}", e),
            }
        }
    })
}
