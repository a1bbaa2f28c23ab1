//! In-process list store.
//!
//! Lists live behind one mutex; a `Notify` wakes blocked pops whenever
//! anything is pushed. Pub/sub uses one broadcast channel per name, dropped
//! once it has no subscribers left.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::stream::{self, BoxStream};
use tokio::sync::{Mutex, Notify, broadcast};
use tokio::time::Instant;

/// Buffered messages per pub/sub channel before slow subscribers lag.
const CHANNEL_CAPACITY: usize = 256;

#[derive(Default)]
struct Inner {
    lists: Mutex<HashMap<String, VecDeque<String>>>,
    pushed: Notify,
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
}

/// List store kept in process memory. Clones share the same lists.
#[derive(Clone, Default)]
pub struct MemoryListStore {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for MemoryListStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryListStore").finish_non_exhaustive()
    }
}

impl MemoryListStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, list: &str, value: &str) {
        self.inner
            .lists
            .lock()
            .await
            .entry(list.to_string())
            .or_default()
            .push_back(value.to_string());
        self.inner.pushed.notify_waiters();
    }

    /// Pop from the first non-empty list in `lists` order, waiting up to
    /// `timeout` for a push. Returns the position of the list it popped from.
    pub async fn pop_blocking(
        &self,
        lists: &[String],
        timeout: Duration,
    ) -> Option<(usize, String)> {
        let deadline = Instant::now() + timeout;

        loop {
            // Register interest before checking so a push between the check
            // and the wait is not missed.
            let notified = self.inner.pushed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(hit) = self.try_pop(lists).await {
                return Some(hit);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return None;
            }
        }
    }

    async fn try_pop(&self, lists: &[String]) -> Option<(usize, String)> {
        let mut guard = self.inner.lists.lock().await;
        lists.iter().enumerate().find_map(|(position, name)| {
            guard
                .get_mut(name)
                .and_then(VecDeque::pop_front)
                .map(|value| (position, value))
        })
    }

    pub async fn len(&self, list: &str) -> u64 {
        self.inner
            .lists
            .lock()
            .await
            .get(list)
            .map_or(0, |l| l.len() as u64)
    }

    pub async fn publish(&self, channel: &str, payload: &str) {
        let mut channels = self.inner.channels.lock().await;
        if let Some(tx) = channels.get(channel) {
            if tx.send(payload.to_string()).is_err() {
                // Nobody listens anymore.
                channels.remove(channel);
            }
        }
    }

    pub async fn subscribe(&self, channel: &str) -> BoxStream<'static, String> {
        let mut channels = self.inner.channels.lock().await;
        // Drop channels whose subscribers have all gone away.
        channels.retain(|_, tx| tx.receiver_count() > 0);
        let rx = channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe();
        drop(channels);

        stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(message) => return Some((message, rx)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!("Subscriber lagged, skipped {} messages", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .boxed()
    }
}
