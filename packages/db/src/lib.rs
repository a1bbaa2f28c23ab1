//! SurrealDB integration for the job queue system.
//!
//! This crate provides the durable job record store. It is the source of
//! truth for job identity and status; the queue index only mirrors it.
//!
//! # Features
//!
//! - `memory` (default): in-memory storage (`mem://`) for tests and local runs
//! - `rocksdb`: RocksDB for persistent file-based storage
//! - `remote`: connect to a SurrealDB server over WebSocket

mod connection;
mod schema;
pub mod repositories;

pub use connection::{Database, DbConfig, DbError};
pub use repositories::{JobFilter, JobRepository};
pub use schema::init_schema;

/// Connect to the database and make sure the schema exists.
///
/// This should be called once at application startup.
pub async fn init(config: &DbConfig) -> Result<Database, DbError> {
    let db = Database::connect(config).await?;
    init_schema(&db).await?;
    Ok(db)
}
