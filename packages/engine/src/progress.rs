//! Progress and lifecycle notifications.
//!
//! Two outlets: the per-job progress channel on the queue index (JSON
//! [`ProgressEvent`]s, best effort) and an in-process broadcast of
//! [`JobEvent`]s.

use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use queue_core::{Job, JobEvent, JobId, ProgressEvent};
use queue_index::{IndexError, QueueIndex};
use tokio::sync::broadcast;

#[derive(Debug, Clone)]
pub struct ProgressPublisher {
    index: QueueIndex,
    events: broadcast::Sender<JobEvent>,
}

impl ProgressPublisher {
    pub fn new(index: QueueIndex, capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity);
        Self { index, events }
    }

    /// Mirror the job's current status and progress to its channel.
    pub async fn job_changed(&self, job: &Job, message: Option<String>) {
        let event = ProgressEvent::new(job.id, job.status, job.progress, message);
        self.publish(event).await;
    }

    /// Publish on the job's channel. Delivery failures are logged, never
    /// returned: observers that are not listening simply miss the event.
    pub async fn publish(&self, event: ProgressEvent) {
        let payload = match serde_json::to_string(&event) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!("Failed to encode progress for job {}: {}", event.job_id, e);
                return;
            }
        };

        if let Err(e) = self.index.publish_progress(event.job_id, &payload).await {
            tracing::warn!("Failed to publish progress for job {}: {}", event.job_id, e);
        }
    }

    /// Broadcast a lifecycle event to in-process subscribers.
    pub fn emit(&self, event: JobEvent) {
        tracing::debug!("{}", event.description());
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// Progress events for one job, from now on.
    pub async fn subscribe(
        &self,
        job_id: JobId,
    ) -> Result<BoxStream<'static, ProgressEvent>, IndexError> {
        let raw = self.index.subscribe_progress(job_id).await?;

        Ok(raw
            .filter_map(|payload| async move {
                match serde_json::from_str::<ProgressEvent>(&payload) {
                    Ok(event) => Some(event),
                    Err(e) => {
                        tracing::warn!("Ignoring malformed progress payload: {}", e);
                        None
                    }
                }
            })
            .boxed())
    }
}
