//! Job domain types for work items in the queue.

use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use ulid::Ulid;

/// Unique identifier for a job, using ULID for chronological sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Ulid);

impl JobId {
    /// Create a new unique job ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Parse a job ID from a string.
    pub fn parse(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error returned when parsing one of the domain enums from a string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

/// Kind of asynchronous work a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Transcription,
    Diarization,
    ModelTraining,
    Synthesis,
}

impl JobType {
    /// Every job type, in a stable order.
    pub const ALL: [JobType; 4] = [
        JobType::Transcription,
        JobType::Diarization,
        JobType::ModelTraining,
        JobType::Synthesis,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Transcription => "transcription",
            JobType::Diarization => "diarization",
            JobType::ModelTraining => "model_training",
            JobType::Synthesis => "synthesis",
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ParseEnumError {
                kind: "job type",
                value: s.to_string(),
            })
    }
}

/// Priority level for job execution order.
///
/// The derived ordering follows declaration order, so `Urgent` compares
/// greatest.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low = 0,
    #[default]
    Normal = 1,
    High = 2,
    Urgent = 3,
}

impl Priority {
    /// Priorities in dispatch order, highest first.
    pub const DESCENDING: [Priority; 4] = [
        Priority::Urgent,
        Priority::High,
        Priority::Normal,
        Priority::Low,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Priority::DESCENDING
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseEnumError {
                kind: "priority",
                value: s.to_string(),
            })
    }
}

/// Current status of a job in its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job is waiting in the queue index to be claimed.
    #[default]
    Queued,
    /// Job is owned by a worker.
    Running,
    /// Job failed and waits for its backoff delay before going back to the queue.
    Retrying,
    /// Job completed successfully.
    Completed,
    /// Job failed and exhausted its retries.
    Failed,
}

/// A status change that the job lifecycle does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid job status transition: {from} -> {to}")]
pub struct TransitionError {
    pub from: JobStatus,
    pub to: JobStatus,
}

impl JobStatus {
    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Queued, Running)
                | (Running, Completed)
                | (Running, Retrying)
                | (Running, Failed)
                | (Retrying, Queued)
        )
    }

    /// Validate a transition, returning the new status.
    pub fn transition(self, next: JobStatus) -> Result<JobStatus, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError {
                from: self,
                to: next,
            })
        }
    }

    /// Status as shown to observers. Retrying is an internal state and is
    /// reported as still running.
    pub fn observed(&self) -> JobStatus {
        match self {
            JobStatus::Retrying => JobStatus::Running,
            other => *other,
        }
    }

    /// Get a simple status string for display and storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Retrying => "retrying",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A job represents a unit of work to be executed by a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier for this job.
    pub id: JobId,
    /// Kind of work, used for routing to worker types.
    pub job_type: JobType,
    /// Execution priority.
    pub priority: Priority,
    /// Current status.
    pub status: JobStatus,
    /// Producer-owned input payload.
    pub input_data: serde_json::Value,
    /// Consumer-owned output payload, set on completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_data: Option<serde_json::Value>,
    /// Jobs that must be completed before this one may run.
    #[serde(default)]
    pub dependencies: Vec<JobId>,
    /// Number of automatic retries performed so far.
    #[serde(default)]
    pub retry_count: u32,
    /// Maximum number of automatic retries.
    pub max_retries: u32,
    /// Progress percentage, 0 to 100.
    #[serde(default)]
    pub progress: u8,
    /// Owning worker while running.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Seconds between start and completion of the successful attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// When the job was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Default number of automatic retries.
    pub const DEFAULT_MAX_RETRIES: u32 = 3;

    /// Create a new queued job.
    pub fn new(job_type: JobType, input_data: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            job_type,
            priority: Priority::default(),
            status: JobStatus::Queued,
            input_data,
            output_data: None,
            dependencies: Vec::new(),
            retry_count: 0,
            max_retries: Self::DEFAULT_MAX_RETRIES,
            progress: 0,
            worker_id: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            actual_duration: None,
            error_message: None,
            updated_at: now,
        }
    }

    /// Set the priority for this job.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the max retries for this job.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the dependencies for this job. Duplicates are collapsed.
    pub fn with_dependencies(mut self, dependencies: impl IntoIterator<Item = JobId>) -> Self {
        let unique: BTreeSet<JobId> = dependencies.into_iter().collect();
        self.dependencies = unique.into_iter().collect();
        self
    }

    /// The queue index key this job is dispatched from.
    pub fn queue_key(&self) -> crate::QueueKey {
        crate::QueueKey::new(self.job_type, self.priority)
    }

    /// Whether another automatic retry is allowed.
    pub fn has_retries_left(&self) -> bool {
        self.retry_count < self.max_retries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_orders_urgent_highest() {
        assert!(Priority::Urgent > Priority::High);
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);

        let mut sorted = Priority::DESCENDING.to_vec();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(sorted, Priority::DESCENDING.to_vec());
    }

    #[test]
    fn enums_round_trip_through_strings() {
        for job_type in JobType::ALL {
            assert_eq!(job_type.as_str().parse::<JobType>(), Ok(job_type));
        }
        assert_eq!("URGENT".parse::<Priority>(), Ok(Priority::Urgent));
        assert!("sometime".parse::<Priority>().is_err());
        assert!("cooking".parse::<JobType>().is_err());
    }

    #[test]
    fn lifecycle_allows_only_documented_transitions() {
        use JobStatus::*;
        let all = [Queued, Running, Retrying, Completed, Failed];
        let allowed = [
            (Queued, Running),
            (Running, Completed),
            (Running, Retrying),
            (Running, Failed),
            (Retrying, Queued),
        ];

        for from in all {
            for to in all {
                let expected = allowed.contains(&(from, to));
                assert_eq!(from.can_transition_to(to), expected, "{from} -> {to}");
            }
        }
    }

    #[test]
    fn terminal_states_have_no_exit() {
        for terminal in [JobStatus::Completed, JobStatus::Failed] {
            assert!(terminal.is_terminal());
            let err = terminal.transition(JobStatus::Queued).unwrap_err();
            assert_eq!(err.from, terminal);
        }
    }

    #[test]
    fn retrying_is_observed_as_running() {
        assert_eq!(JobStatus::Retrying.observed(), JobStatus::Running);
        assert_eq!(JobStatus::Queued.observed(), JobStatus::Queued);
    }

    #[test]
    fn new_job_uses_defaults() {
        let dep = JobId::new();
        let job = Job::new(JobType::Synthesis, serde_json::json!({"text": "hi"}))
            .with_dependencies([dep, dep]);

        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.priority, Priority::Normal);
        assert_eq!(job.max_retries, 3);
        assert_eq!(job.progress, 0);
        assert_eq!(job.dependencies, vec![dep]);
        assert!(job.has_retries_left());
    }
}
