//! Job repository: the durable job record store.
//!
//! Every status change is a single conditional `UPDATE ... WHERE status = ...`
//! so two callers racing on the same record cannot both win a transition.
//! Methods returning `Option<Job>` yield `None` when the guard did not match.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use queue_core::{Job, JobId, JobStatus, JobType, Priority};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::{Database, DbError};

/// Internal record type for SurrealDB.
///
/// The record id is `job:<job_id>`; the id is also kept as a plain field so
/// reads never have to decode SurrealDB record ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct JobRecord {
    job_id: JobId,
    job_type: JobType,
    priority: Priority,
    status: JobStatus,
    input_data: JsonValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    output_data: Option<JsonValue>,
    #[serde(default)]
    dependencies: Vec<JobId>,
    retry_count: u32,
    max_retries: u32,
    progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    worker_id: Option<String>,
    created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    actual_duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
    updated_at: DateTime<Utc>,
}

impl From<&Job> for JobRecord {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id,
            job_type: job.job_type,
            priority: job.priority,
            status: job.status,
            input_data: job.input_data.clone(),
            output_data: job.output_data.clone(),
            dependencies: job.dependencies.clone(),
            retry_count: job.retry_count,
            max_retries: job.max_retries,
            progress: job.progress,
            worker_id: job.worker_id.clone(),
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            actual_duration: job.actual_duration,
            error_message: job.error_message.clone(),
            updated_at: job.updated_at,
        }
    }
}

impl From<JobRecord> for Job {
    fn from(record: JobRecord) -> Self {
        Job {
            id: record.job_id,
            job_type: record.job_type,
            priority: record.priority,
            status: record.status,
            input_data: record.input_data,
            output_data: record.output_data,
            dependencies: record.dependencies,
            retry_count: record.retry_count,
            max_retries: record.max_retries,
            progress: record.progress,
            worker_id: record.worker_id,
            created_at: record.created_at,
            started_at: record.started_at,
            completed_at: record.completed_at,
            actual_duration: record.actual_duration,
            error_message: record.error_message,
            updated_at: record.updated_at,
        }
    }
}

/// Filter options for listing jobs.
#[derive(Debug, Default, Clone)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub job_type: Option<JobType>,
    pub limit: Option<usize>,
}

const CLAIM: &str = r#"
UPDATE type::thing('job', $id)
SET status = 'running', worker_id = $worker_id, started_at = $now, progress = 0, updated_at = $now
WHERE status = 'queued'
RETURN AFTER
"#;

const COMPLETE: &str = r#"
UPDATE type::thing('job', $id)
SET status = 'completed', progress = 100, output_data = $output, completed_at = $now,
    actual_duration = $duration, worker_id = NONE, updated_at = $now
WHERE status = 'running'
RETURN AFTER
"#;

const MARK_RETRYING: &str = r#"
UPDATE type::thing('job', $id)
SET status = 'retrying', retry_count += 1, error_message = $error, progress = 0,
    worker_id = NONE, updated_at = $now
WHERE status = 'running' AND retry_count < max_retries
RETURN AFTER
"#;

const MARK_FAILED: &str = r#"
UPDATE type::thing('job', $id)
SET status = 'failed', error_message = $error, completed_at = $now, worker_id = NONE,
    updated_at = $now
WHERE status = 'running'
RETURN AFTER
"#;

const REQUEUE: &str = r#"
UPDATE type::thing('job', $id)
SET status = 'queued', progress = 0, updated_at = $now
WHERE status = 'retrying'
RETURN AFTER
"#;

const UPDATE_PROGRESS: &str = r#"
UPDATE type::thing('job', $id)
SET progress = $progress, updated_at = $now
WHERE status = 'running' AND progress <= $progress
RETURN AFTER
"#;

/// Repository for job persistence operations.
#[derive(Debug, Clone)]
pub struct JobRepository {
    db: Database,
}

impl JobRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a new job in the database.
    pub async fn create(&self, job: &Job) -> Result<Job, DbError> {
        let record: Option<JobRecord> = self
            .db
            .client()
            .create(("job", job.id.to_string()))
            .content(JobRecord::from(job))
            .await?;

        record
            .map(Job::from)
            .ok_or_else(|| DbError::Query("Failed to create job".into()))
    }

    /// Get a job by ID, or `None` if it does not exist.
    pub async fn find(&self, id: JobId) -> Result<Option<Job>, DbError> {
        let record: Option<JobRecord> = self.db.client().select(("job", id.to_string())).await?;
        Ok(record.map(Job::from))
    }

    /// Get a job by ID.
    pub async fn get(&self, id: JobId) -> Result<Job, DbError> {
        self.find(id)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("Job not found: {}", id)))
    }

    /// List jobs with optional filtering, oldest first.
    pub async fn list(&self, filter: JobFilter) -> Result<Vec<Job>, DbError> {
        let mut conditions = Vec::new();

        if filter.status.is_some() {
            conditions.push("status = $status");
        }
        if filter.job_type.is_some() {
            conditions.push("job_type = $job_type");
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let limit_clause = filter
            .limit
            .map(|l| format!("LIMIT {}", l))
            .unwrap_or_default();

        let query = format!(
            "SELECT * FROM job {} ORDER BY created_at ASC {}",
            where_clause, limit_clause
        );

        let mut request = self.db.client().query(query);
        if let Some(status) = filter.status {
            request = request.bind(("status", status));
        }
        if let Some(job_type) = filter.job_type {
            request = request.bind(("job_type", job_type));
        }

        let mut response = request.await?;
        let records: Vec<JobRecord> = response.take(0)?;

        Ok(records.into_iter().map(Job::from).collect())
    }

    /// QUEUED -> RUNNING, stamping the owner and start time.
    pub async fn claim(&self, id: JobId, worker_id: &str) -> Result<Option<Job>, DbError> {
        let response = self
            .db
            .client()
            .query(CLAIM)
            .bind(("id", id.to_string()))
            .bind(("worker_id", worker_id.to_string()))
            .bind(("now", Utc::now()))
            .await?;

        first(response)
    }

    /// RUNNING -> COMPLETED with output and measured duration.
    pub async fn complete(
        &self,
        id: JobId,
        output: Option<JsonValue>,
        completed_at: DateTime<Utc>,
        actual_duration: Option<f64>,
    ) -> Result<Option<Job>, DbError> {
        let response = self
            .db
            .client()
            .query(COMPLETE)
            .bind(("id", id.to_string()))
            .bind(("output", output))
            .bind(("duration", actual_duration))
            .bind(("now", completed_at))
            .await?;

        first(response)
    }

    /// RUNNING -> RETRYING, consuming one retry. Does not match once the
    /// retry budget is spent.
    pub async fn mark_retrying(&self, id: JobId, error: &str) -> Result<Option<Job>, DbError> {
        let response = self
            .db
            .client()
            .query(MARK_RETRYING)
            .bind(("id", id.to_string()))
            .bind(("error", error.to_string()))
            .bind(("now", Utc::now()))
            .await?;

        first(response)
    }

    /// RUNNING -> FAILED (terminal).
    pub async fn mark_failed(&self, id: JobId, error: &str) -> Result<Option<Job>, DbError> {
        let response = self
            .db
            .client()
            .query(MARK_FAILED)
            .bind(("id", id.to_string()))
            .bind(("error", error.to_string()))
            .bind(("now", Utc::now()))
            .await?;

        first(response)
    }

    /// RETRYING -> QUEUED once the backoff delay elapsed.
    pub async fn requeue(&self, id: JobId) -> Result<Option<Job>, DbError> {
        let response = self
            .db
            .client()
            .query(REQUEUE)
            .bind(("id", id.to_string()))
            .bind(("now", Utc::now()))
            .await?;

        first(response)
    }

    /// Store a new progress value for a running job. Does not match when the
    /// job is not running or the value would go backwards.
    pub async fn update_progress(&self, id: JobId, progress: u8) -> Result<Option<Job>, DbError> {
        let response = self
            .db
            .client()
            .query(UPDATE_PROGRESS)
            .bind(("id", id.to_string()))
            .bind(("progress", progress))
            .bind(("now", Utc::now()))
            .await?;

        first(response)
    }

    /// Count jobs by status.
    pub async fn count_by_status(&self) -> Result<HashMap<JobStatus, u64>, DbError> {
        let mut result = self
            .db
            .client()
            .query("SELECT status, count() AS count FROM job GROUP BY status")
            .await?;

        #[derive(Deserialize)]
        struct StatusCount {
            status: JobStatus,
            count: u64,
        }

        let counts: Vec<StatusCount> = result.take(0)?;

        Ok(counts.into_iter().map(|c| (c.status, c.count)).collect())
    }
}

/// First record returned by a guarded update, if the guard matched.
fn first(mut response: surrealdb::Response) -> Result<Option<Job>, DbError> {
    let records: Vec<JobRecord> = response.take(0)?;
    Ok(records.into_iter().next().map(Job::from))
}
