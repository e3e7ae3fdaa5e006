use thiserror::Error;

use crate::device::DeviceId;
use crate::job::JobId;
use crate::store::StoreError;

/// Errors surfaced by scheduler operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The referenced job does not exist in the store. Surfaced to the
    /// caller, not retried.
    #[error("job not found: {0}")]
    JobNotFound(JobId),

    /// A bind was attempted on an already-bound device. Under the
    /// scheduler's exclusion domain this indicates a logic defect, not an
    /// operational condition.
    #[error("device {0} is already bound")]
    DeviceUnavailable(DeviceId),

    /// The store failed mid-transition; the in-memory decision was rolled
    /// back and the call may be retried.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl SchedulerError {
    /// Whether a retry of the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SchedulerError::Store(err) if err.is_retryable())
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
