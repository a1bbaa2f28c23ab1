use serde::{Deserialize, Serialize};

/// Queue index configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// "mem://" for an in-process index or "redis://host:port"
    pub endpoint: String,
    /// Prefix for every list and channel name
    pub prefix: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            endpoint: "mem://".to_string(),
            prefix: "jobq".to_string(),
        }
    }
}

impl IndexConfig {
    pub fn memory() -> Self {
        Self::default()
    }

    /// Index on a Redis server (requires the redis feature).
    pub fn redis(url: impl Into<String>) -> Self {
        Self {
            endpoint: url.into(),
            ..Default::default()
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }
}
