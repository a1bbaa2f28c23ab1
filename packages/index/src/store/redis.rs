//! Redis-backed list store.
//!
//! Queues are Redis lists (`RPUSH` / `BLPOP`), progress updates go through
//! Redis pub/sub.
//!
//! A `BLPOP` occupies its connection until it returns, so blocking pops run on
//! dedicated connections kept in an idle list and reused across calls. At most
//! one connection per concurrent pop is ever opened.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use tokio::sync::Mutex;

use crate::IndexError;

/// List store backed by a Redis server.
#[derive(Clone)]
pub struct RedisListStore {
    client: redis::Client,
    conn: MultiplexedConnection,
    /// Idle connections for blocking pops.
    blocking: Arc<Mutex<Vec<MultiplexedConnection>>>,
}

impl std::fmt::Debug for RedisListStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisListStore").finish_non_exhaustive()
    }
}

impl RedisListStore {
    pub async fn connect(url: &str) -> Result<Self, IndexError> {
        tracing::info!("Connecting to Redis: {}", url);

        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;

        Ok(Self {
            client,
            conn,
            blocking: Arc::new(Mutex::new(Vec::new())),
        })
    }

    async fn checkout_blocking(&self) -> Result<MultiplexedConnection, IndexError> {
        if let Some(conn) = self.blocking.lock().await.pop() {
            return Ok(conn);
        }
        tracing::debug!("Opening blocking Redis connection");
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    pub async fn push(&self, list: &str, value: &str) -> Result<(), IndexError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.rpush(list, value).await?;
        Ok(())
    }

    /// `BLPOP` over `lists` on a blocking connection, so a long block does not
    /// stall commands queued on the shared one.
    pub async fn pop_blocking(
        &self,
        lists: &[String],
        timeout: Duration,
    ) -> Result<Option<(usize, String)>, IndexError> {
        if lists.is_empty() {
            return Ok(None);
        }

        // A zero timeout would make BLPOP block forever.
        let timeout_secs = timeout.as_secs_f64().max(0.001);
        let mut conn = self.checkout_blocking().await?;
        // A connection that errored is dropped rather than returned.
        let popped: Option<(String, String)> = redis::cmd("BLPOP")
            .arg(lists)
            .arg(timeout_secs)
            .query_async(&mut conn)
            .await?;
        self.blocking.lock().await.push(conn);

        Ok(popped.and_then(|(list, value)| {
            lists
                .iter()
                .position(|name| *name == list)
                .map(|position| (position, value))
        }))
    }

    pub async fn len(&self, list: &str) -> Result<u64, IndexError> {
        let mut conn = self.conn.clone();
        let len: u64 = conn.llen(list).await?;
        Ok(len)
    }

    pub async fn publish(&self, channel: &str, payload: &str) -> Result<(), IndexError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.publish(channel, payload).await?;
        Ok(())
    }

    pub async fn subscribe(&self, channel: &str) -> Result<BoxStream<'static, String>, IndexError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;

        Ok(pubsub
            .into_on_message()
            .filter_map(|message| async move {
                match message.get_payload::<String>() {
                    Ok(payload) => Some(payload),
                    Err(e) => {
                        tracing::warn!("Dropping undecodable pub/sub payload: {}", e);
                        None
                    }
                }
            })
            .boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Runs against `JOBQ_TEST_REDIS_URL` when set, otherwise skips.
    async fn test_store() -> Option<RedisListStore> {
        let url = std::env::var("JOBQ_TEST_REDIS_URL").ok()?;
        Some(RedisListStore::connect(&url).await.unwrap())
    }

    #[tokio::test]
    async fn blocking_pops_reuse_one_connection() {
        let Some(store) = test_store().await else {
            return;
        };
        let list = format!("jobq-test:{}", queue_core::JobId::new());
        let lists = vec![list.clone()];

        store.push(&list, "a").await.unwrap();
        let first = store
            .pop_blocking(&lists, Duration::from_millis(50))
            .await
            .unwrap();
        let second = store
            .pop_blocking(&lists, Duration::from_millis(50))
            .await
            .unwrap();

        assert_eq!(first, Some((0, "a".to_string())));
        assert_eq!(second, None);
        assert_eq!(store.blocking.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_pops_open_one_connection_each() {
        let Some(store) = test_store().await else {
            return;
        };
        let lists = vec![format!("jobq-test:{}", queue_core::JobId::new())];

        let (a, b) = tokio::join!(
            store.pop_blocking(&lists, Duration::from_millis(50)),
            store.pop_blocking(&lists, Duration::from_millis(50)),
        );
        assert_eq!(a.unwrap(), None);
        assert_eq!(b.unwrap(), None);
        assert_eq!(store.blocking.lock().await.len(), 2);

        store
            .pop_blocking(&lists, Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(store.blocking.lock().await.len(), 2);
    }
}
