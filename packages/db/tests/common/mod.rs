use db::{DbConfig, DbError, JobRepository};

/// Fresh in-memory store with the schema applied.
///
/// Every call connects a new `mem://` instance, so tests never share state.
pub async fn setup_repo() -> Result<JobRepository, DbError> {
    let database = db::init(&DbConfig::memory()).await?;
    Ok(JobRepository::new(database))
}
