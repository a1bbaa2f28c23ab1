//! Queue index keys and depth statistics.

use serde::{Deserialize, Serialize};

use crate::{JobType, Priority};

/// Key of one ordered list in the queue index.
///
/// Each `(job type, priority)` pair owns exactly one list of pending job ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QueueKey {
    pub job_type: JobType,
    pub priority: Priority,
}

impl QueueKey {
    pub fn new(job_type: JobType, priority: Priority) -> Self {
        Self { job_type, priority }
    }

    /// Every key in the key space, priority-major.
    pub fn all() -> impl Iterator<Item = QueueKey> {
        Priority::DESCENDING.into_iter().flat_map(|priority| {
            JobType::ALL
                .into_iter()
                .map(move |job_type| QueueKey::new(job_type, priority))
        })
    }

    /// Name of the backing list, namespaced by `prefix`.
    pub fn list_name(&self, prefix: &str) -> String {
        format!("{}:queue:{}:{}", prefix, self.job_type, self.priority)
    }
}

impl std::fmt::Display for QueueKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.job_type, self.priority)
    }
}

/// Depth of a single queue index list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueDepth {
    pub job_type: JobType,
    pub priority: Priority,
    pub depth: u64,
}

/// Snapshot of queue index depths for every `(job type, priority)` key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub queues: Vec<QueueDepth>,
}

impl QueueStats {
    /// Record the depth of one key.
    pub fn push(&mut self, key: QueueKey, depth: u64) {
        self.queues.push(QueueDepth {
            job_type: key.job_type,
            priority: key.priority,
            depth,
        });
    }

    /// Depth of a given key, zero when it was not sampled.
    pub fn depth(&self, key: QueueKey) -> u64 {
        self.queues
            .iter()
            .find(|q| q.job_type == key.job_type && q.priority == key.priority)
            .map_or(0, |q| q.depth)
    }

    /// Total number of pending ids across all keys.
    pub fn total(&self) -> u64 {
        self.queues.iter().map(|q| q.depth).sum()
    }

    /// Total pending ids for one job type across priorities.
    pub fn total_for(&self, job_type: JobType) -> u64 {
        self.queues
            .iter()
            .filter(|q| q.job_type == job_type)
            .map(|q| q.depth)
            .sum()
    }
}
