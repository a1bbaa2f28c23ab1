use db::{DbError, JobRepository};
use queue_core::{Job, JobStatus};

/// Decides whether a job's prerequisites are done.
#[derive(Debug, Clone)]
pub struct DependencyResolver {
    repo: JobRepository,
}

impl DependencyResolver {
    pub fn new(repo: JobRepository) -> Self {
        Self { repo }
    }

    /// True iff every dependency exists and is COMPLETED. Read-only.
    pub async fn is_satisfied(&self, job: &Job) -> Result<bool, DbError> {
        for dependency in &job.dependencies {
            match self.repo.find(*dependency).await? {
                Some(dep) if dep.status == JobStatus::Completed => {}
                Some(dep) => {
                    tracing::debug!(
                        "Job {} waits on {} ({})",
                        job.id,
                        dependency,
                        dep.status
                    );
                    return Ok(false);
                }
                None => {
                    tracing::warn!("Job {} depends on missing job {}", job.id, dependency);
                    return Ok(false);
                }
            }
        }

        Ok(true)
    }
}
