//! Worker pool supervisor.

use std::collections::HashMap;
use std::sync::Arc;

use engine::JobQueue;
use queue_core::WorkerType;
use ractor::{Actor, ActorId, ActorProcessingErr, ActorRef, SupervisionEvent};

use crate::config::PoolConfig;
use crate::handler::JobHandlerRegistry;
use crate::messages::{PoolMessage, PoolStatus, WorkerInfo, WorkerMessage};
use crate::worker_actor::{WorkerActor, WorkerArgs};
use crate::WorkerError;

struct WorkerEntry {
    info: WorkerInfo,
    actor: ActorRef<WorkerMessage>,
}

/// State for the pool actor.
pub struct WorkerPoolState {
    queue: JobQueue,
    handlers: Arc<JobHandlerRegistry>,
    config: PoolConfig,
    workers: HashMap<ActorId, WorkerEntry>,
    /// Worker counter for unique IDs.
    worker_counter: u64,
    restarts: u64,
    stopping: bool,
}

impl WorkerPoolState {
    /// Generate a unique worker ID.
    fn next_worker_id(&mut self, worker_type: WorkerType) -> String {
        self.worker_counter += 1;
        format!("{}-{}", worker_type, self.worker_counter)
    }

    fn status(&self) -> PoolStatus {
        let mut workers: Vec<WorkerInfo> = self.workers.values().map(|w| w.info.clone()).collect();
        workers.sort_by(|a, b| a.worker_id.cmp(&b.worker_id));
        PoolStatus {
            workers,
            restarts: self.restarts,
        }
    }
}

async fn spawn_worker(
    myself: &ActorRef<PoolMessage>,
    state: &mut WorkerPoolState,
    info: WorkerInfo,
) -> Result<(), ActorProcessingErr> {
    let args = WorkerArgs {
        worker_id: info.worker_id.clone(),
        worker_type: info.worker_type,
        queue: state.queue.clone(),
        handlers: state.handlers.clone(),
        idle_backoff: state.config.idle_backoff,
    };

    let (actor, _handle) = Actor::spawn_linked(None, WorkerActor, args, myself.get_cell())
        .await
        .map_err(|e| ActorProcessingErr::from(format!("Failed to spawn worker: {}", e)))?;

    state
        .workers
        .insert(actor.get_id(), WorkerEntry { info, actor });
    Ok(())
}

/// Worker pool arguments.
pub struct WorkerPoolArgs {
    pub queue: JobQueue,
    pub handlers: JobHandlerRegistry,
    pub config: PoolConfig,
}

/// Supervisor that keeps the configured number of workers per worker type
/// running, restarting any that fail.
pub struct WorkerPool;

impl Actor for WorkerPool {
    type Msg = PoolMessage;
    type State = WorkerPoolState;
    type Arguments = WorkerPoolArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting worker pool with {} workers", args.config.total());

        for (worker_type, count) in &args.config.workers {
            if *count > 0 && args.queue.routing().job_types(*worker_type).is_err() {
                return Err(WorkerError::Unrouted(*worker_type).into());
            }
        }

        let mut state = WorkerPoolState {
            queue: args.queue,
            handlers: Arc::new(args.handlers),
            config: args.config,
            workers: HashMap::new(),
            worker_counter: 0,
            restarts: 0,
            stopping: false,
        };

        let plan: Vec<(WorkerType, usize)> = state
            .config
            .workers
            .iter()
            .map(|(worker_type, count)| (*worker_type, *count))
            .collect();
        for (worker_type, count) in plan {
            for _ in 0..count {
                let worker_id = state.next_worker_id(worker_type);
                let info = WorkerInfo {
                    worker_id,
                    worker_type,
                };
                spawn_worker(&myself, &mut state, info).await?;
            }
        }

        Ok(state)
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            PoolMessage::Status { reply } => {
                let _ = reply.send(state.status());
            }

            PoolMessage::Shutdown => {
                tracing::info!("Shutting down worker pool");
                state.stopping = true;
                myself.stop(None);
            }
        }

        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        state.stopping = true;
        for (_, worker) in state.workers.drain() {
            let _ = worker.actor.send_message(WorkerMessage::Shutdown);
        }
        Ok(())
    }

    async fn handle_supervisor_evt(
        &self,
        myself: ActorRef<Self::Msg>,
        message: SupervisionEvent,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            SupervisionEvent::ActorFailed(cell, error) => {
                let Some(worker) = state.workers.remove(&cell.get_id()) else {
                    return Ok(());
                };
                tracing::warn!("Worker {} failed: {}", worker.info.worker_id, error);

                if !state.stopping {
                    state.restarts += 1;
                    spawn_worker(&myself, state, worker.info).await?;
                }
            }
            SupervisionEvent::ActorTerminated(cell, _, reason) => {
                if let Some(worker) = state.workers.remove(&cell.get_id()) {
                    tracing::debug!(
                        "Worker {} terminated: {:?}",
                        worker.info.worker_id,
                        reason
                    );
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Start a worker pool over `queue`.
pub async fn start_pool(
    queue: JobQueue,
    handlers: JobHandlerRegistry,
    config: PoolConfig,
) -> Result<(ActorRef<PoolMessage>, tokio::task::JoinHandle<()>), ractor::SpawnErr> {
    let args = WorkerPoolArgs {
        queue,
        handlers,
        config,
    };
    Actor::spawn(None, WorkerPool, args).await
}
