//! Dequeue protocol.
//!
//! A scan walks the worker type's queue keys priority-major, type-minor and
//! claims the first job that is still QUEUED and whose dependencies are
//! complete. Pop and claim are two separate steps; an id popped by a process
//! that dies before the claim is lost from the index while its record stays
//! QUEUED. The retry scheduler has the mirror gap: a job requeued in the store
//! whose index push then fails is QUEUED but never popped.

use std::collections::HashSet;
use std::time::Duration;

use chrono::Utc;
use db::JobRepository;
use queue_core::{Job, JobEvent, JobId, JobStatus, RoutingTable, WorkerType};
use queue_index::QueueIndex;

use crate::dependency::DependencyResolver;
use crate::progress::ProgressPublisher;
use crate::QueueError;

#[derive(Debug, Clone)]
pub struct Dispatcher {
    repo: JobRepository,
    index: QueueIndex,
    resolver: DependencyResolver,
    publisher: ProgressPublisher,
    routing: RoutingTable,
    pop_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        repo: JobRepository,
        index: QueueIndex,
        publisher: ProgressPublisher,
        routing: RoutingTable,
        pop_timeout: Duration,
    ) -> Self {
        Self {
            resolver: DependencyResolver::new(repo.clone()),
            repo,
            index,
            publisher,
            routing,
            pop_timeout,
        }
    }

    /// Claim one job for `worker_id`, or `None` when a full scan found
    /// nothing claimable.
    ///
    /// A job with unmet dependencies goes back to the tail of its key and the
    /// scan carries on behind it. Meeting the same deferred id twice means the
    /// key holds nothing else claimable, so the scan moves to the next key.
    pub async fn dequeue(
        &self,
        worker_type: WorkerType,
        worker_id: &str,
    ) -> Result<Option<Job>, QueueError> {
        let keys = self.routing.scan_order(worker_type)?;
        let mut deferred: HashSet<JobId> = HashSet::new();
        let mut start = 0;

        while start < keys.len() {
            let Some((offset, job_id)) = self
                .index
                .pop_blocking(&keys[start..], self.pop_timeout)
                .await?
            else {
                break;
            };
            let position = start + offset;
            let key = keys[position];
            start = position;

            let Some(job) = self.repo.find(job_id).await? else {
                tracing::warn!("Discarding {} from {}: no job record", job_id, key);
                continue;
            };

            if job.status != JobStatus::Queued {
                tracing::debug!("Discarding stale {} from {} ({})", job_id, key, job.status);
                continue;
            }

            let satisfied = match self.resolver.is_satisfied(&job).await {
                Ok(satisfied) => satisfied,
                Err(e) => {
                    self.index.push(key, job_id).await?;
                    return Err(e.into());
                }
            };

            if !satisfied {
                self.index.push(key, job_id).await?;
                self.publisher.emit(JobEvent::JobDeferred {
                    job_id,
                    timestamp: Utc::now(),
                });
                if !deferred.insert(job_id) {
                    start = position + 1;
                }
                continue;
            }

            match self.repo.claim(job_id, worker_id).await? {
                Some(job) => {
                    tracing::info!("Job {} claimed by {} ({})", job.id, worker_id, key);
                    self.publisher.emit(JobEvent::JobStarted {
                        job_id: job.id,
                        worker_id: worker_id.to_string(),
                        timestamp: Utc::now(),
                    });
                    self.publisher.job_changed(&job, None).await;
                    return Ok(Some(job));
                }
                None => {
                    tracing::debug!("Lost claim race for {}", job_id);
                }
            }
        }

        Ok(None)
    }
}
