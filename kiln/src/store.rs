use async_trait::async_trait;
use thiserror::Error;

use crate::job::{JobId, JobRecord, JobStatus, JobUpdate};

/// Errors surfaced by a [`JobStore`] backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record exists for the given job id.
    #[error("job not found: {0}")]
    NotFound(JobId),
    /// A record with the same character name already exists.
    #[error("character name already taken: {0}")]
    NameTaken(String),
    /// Backend failure (connection loss, write error, ...). Retryable.
    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether a retry of the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Backend(_))
    }
}

/// Durable record store for training jobs.
///
/// This is the persistence contract the scheduler depends on; the backend
/// technology is the implementor's choice (`PostgresJobStore` behind the
/// `postgres` feature, `InMemoryJobStore` in kiln-testkit). Implementations
/// must route every mutation through [`JobUpdate::apply`] so field
/// semantics (progress monotonicity, `completed_at` set-once, `updated_at`
/// refresh) are uniform across backends.
///
/// Write ownership is split by convention, not enforced by the store: the
/// scheduler owns `status`, `device`, and `queue_position`; the training
/// worker writes `progress` and `error_message` only while its job is
/// `Running`.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Create a new `Pending` job. Fails with [`StoreError::NameTaken`] if
    /// the character name is already used.
    async fn create(&self, character_name: &str) -> Result<JobRecord, StoreError>;

    /// Fetch a job by id.
    async fn get(&self, job_id: JobId) -> Result<JobRecord, StoreError>;

    /// Fetch a job by its unique character name, used upstream for
    /// duplicate-name rejection at submission time.
    async fn get_by_name(&self, name: &str) -> Result<Option<JobRecord>, StoreError>;

    /// Apply a partial update and return the updated record.
    async fn update(&self, job_id: JobId, update: JobUpdate) -> Result<JobRecord, StoreError>;

    /// All jobs currently in the given status, ordered by ascending
    /// creation time. Recovery relies on this ordering.
    async fn list_by_status(&self, status: JobStatus) -> Result<Vec<JobRecord>, StoreError>;

    /// Worker-facing progress report.
    async fn update_progress(&self, job_id: JobId, progress: f64) -> Result<JobRecord, StoreError> {
        self.update(job_id, JobUpdate::new().progress(progress)).await
    }

    /// Worker-facing failure report: marks the job `Failed` with a reason.
    async fn record_failure(&self, job_id: JobId, message: &str) -> Result<JobRecord, StoreError> {
        self.update(
            job_id,
            JobUpdate::new()
                .status(JobStatus::Failed)
                .error_message(message),
        )
        .await
    }
}
