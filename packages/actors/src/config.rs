use std::collections::BTreeMap;
use std::time::Duration;

use queue_core::WorkerType;

use crate::WorkerError;

/// How many workers of each type to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub workers: BTreeMap<WorkerType, usize>,
    /// Pause after a poll that found nothing.
    pub idle_backoff: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: WorkerType::ALL.into_iter().map(|w| (w, 1)).collect(),
            idle_backoff: Duration::from_millis(250),
        }
    }
}

impl PoolConfig {
    /// A pool with no workers.
    pub fn empty() -> Self {
        Self {
            workers: BTreeMap::new(),
            ..Default::default()
        }
    }

    /// Parse `"transcriber=2,trainer=1"`. Worker types not listed get none.
    pub fn parse(raw: &str) -> Result<Self, WorkerError> {
        let mut config = Self::empty();

        for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (name, count) = entry.split_once('=').ok_or_else(|| {
                WorkerError::Config(format!("expected type=count, got {:?}", entry))
            })?;
            let worker_type: WorkerType = name
                .trim()
                .parse::<WorkerType>()
                .map_err(|e| WorkerError::Config(e.to_string()))?;
            let count: usize = count
                .trim()
                .parse()
                .map_err(|e| WorkerError::Config(format!("{}: {}", entry, e)))?;
            config.workers.insert(worker_type, count);
        }

        Ok(config)
    }

    pub fn with_workers(mut self, worker_type: WorkerType, count: usize) -> Self {
        self.workers.insert(worker_type, count);
        self
    }

    pub fn with_idle_backoff(mut self, idle_backoff: Duration) -> Self {
        self.idle_backoff = idle_backoff;
        self
    }

    pub fn total(&self) -> usize {
        self.workers.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_worker_counts() {
        let config = PoolConfig::parse("transcriber=2, trainer=1").unwrap();

        assert_eq!(config.workers.get(&WorkerType::Transcriber), Some(&2));
        assert_eq!(config.workers.get(&WorkerType::Trainer), Some(&1));
        assert_eq!(config.workers.get(&WorkerType::Synthesizer), None);
        assert_eq!(config.total(), 3);
    }

    #[test]
    fn rejects_malformed_entries() {
        assert!(PoolConfig::parse("transcriber").is_err());
        assert!(PoolConfig::parse("painter=1").is_err());
        assert!(PoolConfig::parse("trainer=many").is_err());
        assert_eq!(PoolConfig::parse("").unwrap().total(), 0);
    }
}
