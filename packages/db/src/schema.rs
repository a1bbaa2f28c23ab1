//! Database schema definitions using SurrealQL.

use crate::{Database, DbError};

/// Initialize the database schema.
///
/// This creates the job table, its typed fields and indexes. Safe to run on
/// every start.
pub async fn init_schema(db: &Database) -> Result<(), DbError> {
    tracing::info!("Initializing database schema...");

    db.client().query(JOB_SCHEMA).await?.check()?;

    tracing::info!("Database schema initialized");

    Ok(())
}

/// Job table schema.
///
/// The table stays schemaless so producer and consumer payloads are stored
/// untouched; fields used by status guards and indexes are typed.
const JOB_SCHEMA: &str = r#"
DEFINE TABLE IF NOT EXISTS job SCHEMALESS;

DEFINE FIELD IF NOT EXISTS job_id ON job TYPE string;
DEFINE FIELD IF NOT EXISTS job_type ON job TYPE string;
DEFINE FIELD IF NOT EXISTS priority ON job TYPE string;
DEFINE FIELD IF NOT EXISTS status ON job TYPE string;
DEFINE FIELD IF NOT EXISTS dependencies ON job TYPE array<string>;
DEFINE FIELD IF NOT EXISTS retry_count ON job TYPE int;
DEFINE FIELD IF NOT EXISTS max_retries ON job TYPE int;
DEFINE FIELD IF NOT EXISTS progress ON job TYPE int ASSERT $value >= 0 AND $value <= 100;

DEFINE INDEX IF NOT EXISTS job_id_unique ON job FIELDS job_id UNIQUE;
DEFINE INDEX IF NOT EXISTS job_status ON job FIELDS status;
DEFINE INDEX IF NOT EXISTS job_type_status ON job FIELDS job_type, status;
"#;
