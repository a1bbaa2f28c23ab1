//! Engine configuration.

use std::time::Duration;

use db::DbConfig;
use queue_core::{RetryPolicy, RoutingTable};
use queue_index::IndexConfig;

use crate::QueueError;

/// Everything [`JobQueue::connect`](crate::JobQueue::connect) needs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub db: DbConfig,
    pub index: IndexConfig,
    pub routing: RoutingTable,
    pub retry: RetryPolicy,
    /// Bounded wait of one blocking pop during a dispatcher scan.
    pub pop_timeout: Duration,
    /// Buffered lifecycle events per subscriber before it lags.
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            db: DbConfig::default(),
            index: IndexConfig::default(),
            routing: RoutingTable::default(),
            retry: RetryPolicy::default(),
            pop_timeout: Duration::from_secs(1),
            event_capacity: 1024,
        }
    }
}

impl EngineConfig {
    /// Build a config from `JOBQ_*` environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self, QueueError> {
        let mut config = Self::default();

        if let Some(endpoint) = env_var("JOBQ_DB_ENDPOINT") {
            config.db.endpoint = endpoint;
        }
        if let Some(namespace) = env_var("JOBQ_DB_NAMESPACE") {
            config.db.namespace = namespace;
        }
        if let Some(database) = env_var("JOBQ_DB_DATABASE") {
            config.db.database = database;
        }
        match (env_var("JOBQ_DB_USER"), env_var("JOBQ_DB_PASS")) {
            (Some(user), Some(pass)) => config.db.credentials = Some((user, pass)),
            (None, None) => {}
            _ => {
                return Err(QueueError::Config(
                    "JOBQ_DB_USER and JOBQ_DB_PASS must be set together".into(),
                ));
            }
        }

        if let Some(url) = env_var("JOBQ_INDEX_URL") {
            config.index.endpoint = url;
        }
        if let Some(prefix) = env_var("JOBQ_INDEX_PREFIX") {
            config.index.prefix = prefix;
        }

        if let Some(ms) = env_millis("JOBQ_POP_TIMEOUT_MS")? {
            config.pop_timeout = ms;
        }
        if let Some(ms) = env_millis("JOBQ_RETRY_BASE_MS")? {
            config.retry = RetryPolicy::new(ms);
        }

        if let Some(raw) = env_var("JOBQ_ROUTES") {
            config.routing = serde_json::from_str(&raw)
                .map_err(|e| QueueError::Config(format!("JOBQ_ROUTES: {}", e)))?;
        }

        Ok(config)
    }

    pub fn with_db(mut self, db: DbConfig) -> Self {
        self.db = db;
        self
    }

    pub fn with_index(mut self, index: IndexConfig) -> Self {
        self.index = index;
        self
    }

    pub fn with_routing(mut self, routing: RoutingTable) -> Self {
        self.routing = routing;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_pop_timeout(mut self, pop_timeout: Duration) -> Self {
        self.pop_timeout = pop_timeout;
        self
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_millis(name: &str) -> Result<Option<Duration>, QueueError> {
    env_var(name)
        .map(|raw| {
            raw.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|e| QueueError::Config(format!("{}: {}", name, e)))
        })
        .transpose()
}
