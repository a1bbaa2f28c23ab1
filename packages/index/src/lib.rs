//! Queue index: per-(job type, priority) FIFO lists of job ids plus a
//! pub/sub channel per job for progress.
//!
//! Holds ids only; the job records themselves live in the `db` crate.

mod config;
mod error;
mod index;
pub mod store;

pub use config::IndexConfig;
pub use error::IndexError;
pub use index::QueueIndex;
pub use store::{ListStore, MemoryListStore};
#[cfg(feature = "redis")]
pub use store::RedisListStore;
