//! Static routing from worker types to the job types they may claim.

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{JobType, ParseEnumError, Priority, QueueKey};

/// Class of worker process authorized to claim a fixed set of job types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerType {
    Transcriber,
    Trainer,
    Synthesizer,
}

impl WorkerType {
    pub const ALL: [WorkerType; 3] = [
        WorkerType::Transcriber,
        WorkerType::Trainer,
        WorkerType::Synthesizer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerType::Transcriber => "transcriber",
            WorkerType::Trainer => "trainer",
            WorkerType::Synthesizer => "synthesizer",
        }
    }
}

impl std::fmt::Display for WorkerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkerType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WorkerType::ALL
            .into_iter()
            .find(|w| w.as_str() == s)
            .ok_or_else(|| ParseEnumError {
                kind: "worker type",
                value: s.to_string(),
            })
    }
}

/// Problems found while validating a routing table.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    #[error("worker type {0} has no job types")]
    EmptyRoute(WorkerType),
    #[error("worker type {worker} lists job type {job_type} more than once")]
    DuplicateJobType {
        worker: WorkerType,
        job_type: JobType,
    },
    #[error("job type {0} is not claimable by any worker type")]
    Unrouted(JobType),
    #[error("worker type {0} is not configured")]
    UnknownWorker(WorkerType),
}

/// Mapping `worker type -> job types`, fixed per deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoutingTable {
    routes: BTreeMap<WorkerType, Vec<JobType>>,
}

impl RoutingTable {
    /// Create an empty table.
    pub fn empty() -> Self {
        Self {
            routes: BTreeMap::new(),
        }
    }

    /// Add or replace the route for a worker type. Order of `job_types` is the
    /// type order used within each priority when scanning.
    pub fn route(
        mut self,
        worker: WorkerType,
        job_types: impl IntoIterator<Item = JobType>,
    ) -> Self {
        self.routes.insert(worker, job_types.into_iter().collect());
        self
    }

    /// Check the table is usable: every route non-empty and duplicate-free, and
    /// every job type claimable by someone.
    pub fn validate(&self) -> Result<(), RoutingError> {
        let mut covered = BTreeSet::new();

        for (worker, job_types) in &self.routes {
            if job_types.is_empty() {
                return Err(RoutingError::EmptyRoute(*worker));
            }
            let mut seen = BTreeSet::new();
            for job_type in job_types {
                if !seen.insert(*job_type) {
                    return Err(RoutingError::DuplicateJobType {
                        worker: *worker,
                        job_type: *job_type,
                    });
                }
                covered.insert(*job_type);
            }
        }

        match JobType::ALL.into_iter().find(|t| !covered.contains(t)) {
            Some(unrouted) => Err(RoutingError::Unrouted(unrouted)),
            None => Ok(()),
        }
    }

    /// Job types a worker type may claim.
    pub fn job_types(&self, worker: WorkerType) -> Result<&[JobType], RoutingError> {
        self.routes
            .get(&worker)
            .map(Vec::as_slice)
            .ok_or(RoutingError::UnknownWorker(worker))
    }

    /// Queue keys a worker of this type polls, priority-major and type-minor.
    pub fn scan_order(&self, worker: WorkerType) -> Result<Vec<QueueKey>, RoutingError> {
        let job_types = self.job_types(worker)?;
        Ok(Priority::DESCENDING
            .into_iter()
            .flat_map(|priority| {
                job_types
                    .iter()
                    .map(move |job_type| QueueKey::new(*job_type, priority))
            })
            .collect())
    }
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::empty()
            .route(
                WorkerType::Transcriber,
                [JobType::Transcription, JobType::Diarization],
            )
            .route(WorkerType::Trainer, [JobType::ModelTraining])
            .route(WorkerType::Synthesizer, [JobType::Synthesis])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_is_valid() {
        assert_eq!(RoutingTable::default().validate(), Ok(()));
    }

    #[test]
    fn scan_order_is_priority_major() {
        let table = RoutingTable::default();
        let keys = table.scan_order(WorkerType::Transcriber).unwrap();

        assert_eq!(keys.len(), 8);
        assert_eq!(keys[0], QueueKey::new(JobType::Transcription, Priority::Urgent));
        assert_eq!(keys[1], QueueKey::new(JobType::Diarization, Priority::Urgent));
        assert_eq!(keys[2], QueueKey::new(JobType::Transcription, Priority::High));
        assert_eq!(keys[7], QueueKey::new(JobType::Diarization, Priority::Low));
    }

    #[test]
    fn validation_rejects_bad_tables() {
        let empty = RoutingTable::default().route(WorkerType::Trainer, []);
        assert_eq!(
            empty.validate(),
            Err(RoutingError::EmptyRoute(WorkerType::Trainer))
        );

        let duplicate = RoutingTable::default().route(
            WorkerType::Synthesizer,
            [JobType::Synthesis, JobType::Synthesis],
        );
        assert!(matches!(
            duplicate.validate(),
            Err(RoutingError::DuplicateJobType { .. })
        ));

        let unrouted = RoutingTable::empty()
            .route(WorkerType::Transcriber, [JobType::Transcription, JobType::Diarization])
            .route(WorkerType::Synthesizer, [JobType::Synthesis]);
        assert_eq!(
            unrouted.validate(),
            Err(RoutingError::Unrouted(JobType::ModelTraining))
        );
    }

    #[test]
    fn unknown_worker_has_no_scan_order() {
        let table = RoutingTable::empty().route(WorkerType::Trainer, JobType::ALL);
        assert_eq!(
            table.scan_order(WorkerType::Synthesizer),
            Err(RoutingError::UnknownWorker(WorkerType::Synthesizer))
        );
    }

    #[test]
    fn table_parses_from_json() {
        let table: RoutingTable = serde_json::from_str(
            r#"{
                "transcriber": ["transcription", "diarization", "synthesis"],
                "trainer": ["model_training"]
            }"#,
        )
        .unwrap();

        assert_eq!(table.validate(), Ok(()));
        assert_eq!(
            table.job_types(WorkerType::Transcriber).unwrap(),
            &[JobType::Transcription, JobType::Diarization, JobType::Synthesis]
        );
    }
}
