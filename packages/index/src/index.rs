//! Typed view over the list store.
//!
//! Each `(job type, priority)` pair maps to one list named
//! `{prefix}:queue:{job_type}:{priority}`; per-job progress goes to
//! `{prefix}:progress:{job_id}`.

use std::time::Duration;

use futures_util::stream::BoxStream;
use queue_core::{JobId, QueueKey};

use crate::store::ListStore;
use crate::{IndexConfig, IndexError};

#[derive(Debug, Clone)]
pub struct QueueIndex {
    store: ListStore,
    prefix: String,
}

impl QueueIndex {
    pub async fn connect(config: &IndexConfig) -> Result<Self, IndexError> {
        let store = ListStore::connect(config).await?;
        Ok(Self::new(store, config.prefix.clone()))
    }

    pub fn new(store: ListStore, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Append a job id to the tail of its queue.
    pub async fn push(&self, key: QueueKey, job_id: JobId) -> Result<(), IndexError> {
        self.store
            .push(&key.list_name(&self.prefix), &job_id.to_string())
            .await
    }

    /// Pop the oldest id from the first non-empty queue in `keys` order,
    /// blocking up to `timeout`. Returns the position in `keys` it came from.
    ///
    /// Entries that are not valid job ids are dropped with a warning.
    pub async fn pop_blocking(
        &self,
        keys: &[QueueKey],
        timeout: Duration,
    ) -> Result<Option<(usize, JobId)>, IndexError> {
        let lists: Vec<String> = keys.iter().map(|k| k.list_name(&self.prefix)).collect();

        loop {
            let Some((position, raw)) = self.store.pop_blocking(&lists, timeout).await? else {
                return Ok(None);
            };

            match JobId::parse(&raw) {
                Ok(job_id) => return Ok(Some((position, job_id))),
                Err(e) => tracing::warn!(
                    "Dropping malformed entry {:?} from {}: {}",
                    raw,
                    lists[position],
                    e
                ),
            }
        }
    }

    pub async fn length(&self, key: QueueKey) -> Result<u64, IndexError> {
        self.store.len(&key.list_name(&self.prefix)).await
    }

    pub fn progress_channel(&self, job_id: JobId) -> String {
        format!("{}:progress:{}", self.prefix, job_id)
    }

    pub async fn publish_progress(&self, job_id: JobId, payload: &str) -> Result<(), IndexError> {
        self.store
            .publish(&self.progress_channel(job_id), payload)
            .await
    }

    pub async fn subscribe_progress(
        &self,
        job_id: JobId,
    ) -> Result<BoxStream<'static, String>, IndexError> {
        self.store.subscribe(&self.progress_channel(job_id)).await
    }
}
