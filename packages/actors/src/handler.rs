//! Job handler trait and registry.

use engine::{JobQueue, QueueError};
use queue_core::{Job, JobId, JobType};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Result type for job handlers: output data on success, error message on
/// failure.
pub type HandlerResult = Result<Option<JsonValue>, String>;

/// Future type for async job handlers.
pub type HandlerFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send>>;

/// Handle a running job uses to talk back to the queue.
#[derive(Debug, Clone)]
pub struct JobContext {
    queue: JobQueue,
    job_id: JobId,
    worker_id: String,
}

impl JobContext {
    pub fn new(queue: JobQueue, job_id: JobId, worker_id: impl Into<String>) -> Self {
        Self {
            queue,
            job_id,
            worker_id: worker_id.into(),
        }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Report progress (0-100) for the job being handled.
    pub async fn report_progress(
        &self,
        progress: u8,
        message: Option<String>,
    ) -> Result<(), QueueError> {
        self.queue
            .report_progress(self.job_id, progress, message)
            .await
            .map(|_| ())
    }
}

/// Trait for job handlers.
///
/// Implement this trait to define how jobs of a specific type are processed.
pub trait JobHandler: Send + Sync + 'static {
    /// The job type this handler processes.
    fn job_type(&self) -> JobType;

    /// Process a job and return its output.
    fn handle(&self, job: Job, ctx: JobContext) -> HandlerFuture;
}

/// Registry for job handlers, one per job type.
#[derive(Default)]
pub struct JobHandlerRegistry {
    handlers: HashMap<JobType, Arc<dyn JobHandler>>,
}

impl JobHandlerRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler, replacing any previous one for the same job type.
    pub fn register<H: JobHandler>(&mut self, handler: H) {
        self.handlers.insert(handler.job_type(), Arc::new(handler));
    }

    /// Get a handler for a job type.
    pub fn get(&self, job_type: JobType) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(&job_type).cloned()
    }

    /// Check if a handler exists for a job type.
    pub fn has_handler(&self, job_type: JobType) -> bool {
        self.handlers.contains_key(&job_type)
    }

    /// List all registered job types.
    pub fn job_types(&self) -> Vec<JobType> {
        let mut types: Vec<JobType> = self.handlers.keys().copied().collect();
        types.sort();
        types
    }
}

/// A simple function-based job handler.
pub struct FnHandler<F>
where
    F: Fn(Job, JobContext) -> HandlerFuture + Send + Sync + 'static,
{
    job_type: JobType,
    handler: F,
}

impl<F> FnHandler<F>
where
    F: Fn(Job, JobContext) -> HandlerFuture + Send + Sync + 'static,
{
    /// Create a new function-based handler.
    pub fn new(job_type: JobType, handler: F) -> Self {
        Self { job_type, handler }
    }
}

impl<F> JobHandler for FnHandler<F>
where
    F: Fn(Job, JobContext) -> HandlerFuture + Send + Sync + 'static,
{
    fn job_type(&self) -> JobType {
        self.job_type
    }

    fn handle(&self, job: Job, ctx: JobContext) -> HandlerFuture {
        (self.handler)(job, ctx)
    }
}

/// Helper macro for creating job handlers from async blocks.
///
/// ```ignore
/// let handler = job_handler!(JobType::Synthesis, |job, ctx| {
///     ctx.report_progress(50, None).await.map_err(|e| e.to_string())?;
///     Ok(Some(job.input_data))
/// });
/// ```
#[macro_export]
macro_rules! job_handler {
    ($job_type:expr, |$job:ident, $ctx:ident| $body:expr) => {
        $crate::FnHandler::new(
            $job_type,
            |$job: ::queue_core::Job, $ctx: $crate::JobContext| -> $crate::HandlerFuture {
                Box::pin(async move { $body })
            },
        )
    };
}
