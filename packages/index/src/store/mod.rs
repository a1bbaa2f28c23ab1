//! List and pub/sub backends.

mod memory;
#[cfg(feature = "redis")]
mod redis;

use std::time::Duration;

use futures_util::stream::BoxStream;

pub use memory::MemoryListStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisListStore;

use crate::{IndexConfig, IndexError};

/// Backend selected from the endpoint scheme.
#[derive(Debug, Clone)]
pub enum ListStore {
    Memory(MemoryListStore),
    #[cfg(feature = "redis")]
    Redis(RedisListStore),
}

impl ListStore {
    pub async fn connect(config: &IndexConfig) -> Result<Self, IndexError> {
        let endpoint = config.endpoint.as_str();

        if endpoint.starts_with("mem://") {
            return Ok(Self::Memory(MemoryListStore::new()));
        }

        #[cfg(feature = "redis")]
        if endpoint.starts_with("redis://") || endpoint.starts_with("rediss://") {
            return Ok(Self::Redis(RedisListStore::connect(endpoint).await?));
        }

        Err(IndexError::UnsupportedEndpoint(endpoint.to_string()))
    }

    /// Append `value` to the tail of `list`.
    pub async fn push(&self, list: &str, value: &str) -> Result<(), IndexError> {
        match self {
            Self::Memory(store) => {
                store.push(list, value).await;
                Ok(())
            }
            #[cfg(feature = "redis")]
            Self::Redis(store) => store.push(list, value).await,
        }
    }

    /// Pop the head of the first non-empty list, blocking up to `timeout`.
    pub async fn pop_blocking(
        &self,
        lists: &[String],
        timeout: Duration,
    ) -> Result<Option<(usize, String)>, IndexError> {
        match self {
            Self::Memory(store) => Ok(store.pop_blocking(lists, timeout).await),
            #[cfg(feature = "redis")]
            Self::Redis(store) => store.pop_blocking(lists, timeout).await,
        }
    }

    pub async fn len(&self, list: &str) -> Result<u64, IndexError> {
        match self {
            Self::Memory(store) => Ok(store.len(list).await),
            #[cfg(feature = "redis")]
            Self::Redis(store) => store.len(list).await,
        }
    }

    /// Fire-and-forget broadcast to current subscribers of `channel`.
    pub async fn publish(&self, channel: &str, payload: &str) -> Result<(), IndexError> {
        match self {
            Self::Memory(store) => {
                store.publish(channel, payload).await;
                Ok(())
            }
            #[cfg(feature = "redis")]
            Self::Redis(store) => store.publish(channel, payload).await,
        }
    }

    pub async fn subscribe(&self, channel: &str) -> Result<BoxStream<'static, String>, IndexError> {
        match self {
            Self::Memory(store) => Ok(store.subscribe(channel).await),
            #[cfg(feature = "redis")]
            Self::Redis(store) => store.subscribe(channel).await,
        }
    }
}
