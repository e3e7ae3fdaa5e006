use async_trait::async_trait;
use kiln::{JobId, JobRecord, JobStatus, JobStore, JobUpdate, StoreError};
use parking_lot::Mutex;
use std::sync::Arc;

use crate::InMemoryJobStore;

/// Job store wrapper that injects backend failures on demand.
///
/// Wraps an [`InMemoryJobStore`] and fails the next N `update` calls with
/// a retryable `StoreError::Backend`, letting tests drive the scheduler's
/// decide-persist-rollback paths deterministically.
#[derive(Clone)]
pub struct FlakyJobStore {
    inner: InMemoryJobStore,
    failures_remaining: Arc<Mutex<usize>>,
    injected: Arc<Mutex<usize>>,
}

impl FlakyJobStore {
    pub fn new(inner: InMemoryJobStore) -> Self {
        Self {
            inner,
            failures_remaining: Arc::new(Mutex::new(0)),
            injected: Arc::new(Mutex::new(0)),
        }
    }

    /// The wrapped store, for seeding and snapshots.
    pub fn inner(&self) -> &InMemoryJobStore {
        &self.inner
    }

    /// Fail the next `count` update calls.
    pub fn fail_next_updates(&self, count: usize) {
        *self.failures_remaining.lock() = count;
    }

    /// How many failures have been injected so far.
    pub fn injected_failures(&self) -> usize {
        *self.injected.lock()
    }

    fn take_failure(&self) -> bool {
        let mut remaining = self.failures_remaining.lock();
        if *remaining == 0 {
            return false;
        }
        *remaining -= 1;
        *self.injected.lock() += 1;
        true
    }
}

#[async_trait]
impl JobStore for FlakyJobStore {
    async fn create(&self, character_name: &str) -> Result<JobRecord, StoreError> {
        self.inner.create(character_name).await
    }

    async fn get(&self, job_id: JobId) -> Result<JobRecord, StoreError> {
        self.inner.get(job_id).await
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<JobRecord>, StoreError> {
        self.inner.get_by_name(name).await
    }

    async fn update(&self, job_id: JobId, update: JobUpdate) -> Result<JobRecord, StoreError> {
        if self.take_failure() {
            return Err(StoreError::Backend("injected update failure".to_string()));
        }
        self.inner.update(job_id, update).await
    }

    async fn list_by_status(&self, status: JobStatus) -> Result<Vec<JobRecord>, StoreError> {
        self.inner.list_by_status(status).await
    }
}
