//! Worker actor: a cooperative polling loop over `JobQueue::dequeue`.

use std::sync::Arc;
use std::time::Duration;

use engine::{JobQueue, QueueError};
use queue_core::{Job, WorkerType};
use ractor::{Actor, ActorProcessingErr, ActorRef};

use crate::handler::{JobContext, JobHandlerRegistry};
use crate::messages::WorkerMessage;

/// State for the worker actor.
pub struct WorkerActorState {
    /// Unique worker ID, stamped on claimed jobs.
    pub worker_id: String,
    pub worker_type: WorkerType,
    pub queue: JobQueue,
    pub handlers: Arc<JobHandlerRegistry>,
    pub idle_backoff: Duration,
    /// Whether the worker should keep polling.
    pub running: bool,
}

impl WorkerActorState {
    /// Run one claimed job to completion and resolve it on the queue.
    async fn run(&self, job: Job) {
        let job_id = job.id;

        let Some(handler) = self.handlers.get(job.job_type) else {
            let error = format!("No handler for job type: {}", job.job_type);
            if let Err(e) = self.queue.fail(job_id, &error).await {
                tracing::warn!("{}: failed to record failure of {}: {}", self.worker_id, job_id, e);
            }
            return;
        };

        let ctx = JobContext::new(self.queue.clone(), job_id, self.worker_id.clone());
        // Own task so a panicking handler fails the job instead of the worker.
        let outcome = tokio::spawn(handler.handle(job, ctx)).await;

        let resolved = match outcome {
            Ok(Ok(output)) => self.queue.succeed(job_id, output).await.map(|_| ()),
            Ok(Err(error)) => self.queue.fail(job_id, &error).await.map(|_| ()),
            Err(join_error) => self
                .queue
                .fail(job_id, &format!("Handler panicked: {}", join_error))
                .await
                .map(|_| ()),
        };

        if let Err(e) = resolved {
            tracing::warn!("{}: could not resolve job {}: {}", self.worker_id, job_id, e);
        }
    }
}

/// Worker actor arguments.
pub struct WorkerArgs {
    pub worker_id: String,
    pub worker_type: WorkerType,
    pub queue: JobQueue,
    pub handlers: Arc<JobHandlerRegistry>,
    pub idle_backoff: Duration,
}

/// Worker actor that claims and executes jobs for one worker type.
pub struct WorkerActor;

impl Actor for WorkerActor {
    type Msg = WorkerMessage;
    type State = WorkerActorState;
    type Arguments = WorkerArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!("Starting worker: {} ({})", args.worker_id, args.worker_type);

        // Start the work loop
        myself.send_message(WorkerMessage::Poll)?;

        Ok(WorkerActorState {
            worker_id: args.worker_id,
            worker_type: args.worker_type,
            queue: args.queue,
            handlers: args.handlers,
            idle_backoff: args.idle_backoff,
            running: true,
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            WorkerMessage::Poll => {
                if !state.running {
                    return Ok(());
                }

                match state.queue.dequeue(state.worker_type, &state.worker_id).await {
                    Ok(Some(job)) => {
                        state.run(job).await;
                        myself.send_message(WorkerMessage::Poll)?;
                    }
                    Ok(None) => {
                        myself.send_after(state.idle_backoff, || WorkerMessage::Poll);
                    }
                    Err(QueueError::ShutDown) => {
                        tracing::info!("Job queue closed, stopping worker: {}", state.worker_id);
                        state.running = false;
                        myself.stop(None);
                    }
                    Err(e) => {
                        tracing::warn!("{}: dequeue failed: {}", state.worker_id, e);
                        myself.send_after(state.idle_backoff, || WorkerMessage::Poll);
                    }
                }
            }

            WorkerMessage::Shutdown => {
                tracing::info!("Shutting down worker: {}", state.worker_id);
                state.running = false;
                myself.stop(None);
            }
        }

        Ok(())
    }
}
