//! Worker runtime for the job queue.
//!
//! Runs workers as Ractor actors inside one process.
//!
//! # Architecture
//!
//! - `WorkerPool` - Supervisor that spawns N workers per worker type and
//!   restarts failed ones
//! - `WorkerActor` - Polls `JobQueue::dequeue`, runs the registered handler
//!   and reports success or failure
//! - `JobHandler` - What a worker runs for one job type
//!
//! # Usage
//!
//! ```ignore
//! use actors::{JobHandlerRegistry, PoolConfig, PoolMessage, start_pool};
//!
//! let mut handlers = JobHandlerRegistry::new();
//! handlers.register(my_transcription_handler);
//!
//! let (pool, handle) = start_pool(queue, handlers, PoolConfig::parse("transcriber=2")?).await?;
//! // ...
//! pool.send_message(PoolMessage::Shutdown)?;
//! handle.await?;
//! ```

mod config;
mod handler;
mod messages;
mod supervisor;
mod worker_actor;

pub use config::PoolConfig;
pub use handler::{
    FnHandler, HandlerFuture, HandlerResult, JobContext, JobHandler, JobHandlerRegistry,
};
pub use messages::{PoolMessage, PoolStatus, WorkerError, WorkerInfo, WorkerMessage};
pub use supervisor::{WorkerPool, WorkerPoolArgs, start_pool};
pub use worker_actor::{WorkerActor, WorkerArgs};

/// Re-export ractor types for convenience.
pub use ractor::{Actor, ActorRef, RpcReplyPort, concurrency};
