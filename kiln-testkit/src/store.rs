use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kiln::{JobId, JobRecord, JobStatus, JobStore, JobUpdate, StoreError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// In-memory implementation of the job store contract.
///
/// Mirrors the durable-store semantics the scheduler relies on: unique
/// character names, `JobUpdate::apply` field rules, and creation-time
/// ordering from `list_by_status`.
#[derive(Clone, Default)]
pub struct InMemoryJobStore {
    jobs: Arc<Mutex<HashMap<JobId, JobRecord>>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an arbitrary record, bypassing `create`. Recovery tests use
    /// this to stage persisted state (e.g. `Running` jobs with explicit
    /// creation times) as it would look after a crash.
    pub fn insert(&self, record: JobRecord) {
        self.jobs.lock().insert(record.id, record);
    }

    /// Current copy of a record, if it exists.
    pub fn snapshot(&self, job_id: JobId) -> Option<JobRecord> {
        self.jobs.lock().get(&job_id).cloned()
    }

    /// All records, unordered.
    pub fn all(&self) -> Vec<JobRecord> {
        self.jobs.lock().values().cloned().collect()
    }

    /// Drop a record, simulating external deletion.
    pub fn delete(&self, job_id: JobId) -> bool {
        self.jobs.lock().remove(&job_id).is_some()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, character_name: &str) -> Result<JobRecord, StoreError> {
        let mut jobs = self.jobs.lock();
        if jobs
            .values()
            .any(|record| record.character_name == character_name)
        {
            return Err(StoreError::NameTaken(character_name.to_string()));
        }
        let record = JobRecord::new(character_name);
        jobs.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get(&self, job_id: JobId) -> Result<JobRecord, StoreError> {
        self.jobs
            .lock()
            .get(&job_id)
            .cloned()
            .ok_or(StoreError::NotFound(job_id))
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<JobRecord>, StoreError> {
        Ok(self
            .jobs
            .lock()
            .values()
            .find(|record| record.character_name == name)
            .cloned())
    }

    async fn update(&self, job_id: JobId, update: JobUpdate) -> Result<JobRecord, StoreError> {
        let mut jobs = self.jobs.lock();
        let record = jobs.get_mut(&job_id).ok_or(StoreError::NotFound(job_id))?;
        update.apply(record, Utc::now());
        Ok(record.clone())
    }

    async fn list_by_status(&self, status: JobStatus) -> Result<Vec<JobRecord>, StoreError> {
        let mut records: Vec<JobRecord> = self
            .jobs
            .lock()
            .values()
            .filter(|record| record.status == status)
            .cloned()
            .collect();
        records.sort_by_key(|record| record.created_at);
        Ok(records)
    }
}

/// Build a record with an explicit status and creation time, for staging
/// pre-crash store contents in recovery tests.
pub fn make_record(
    character_name: &str,
    status: JobStatus,
    created_at: DateTime<Utc>,
) -> JobRecord {
    let mut record = JobRecord::new(character_name);
    record.status = status;
    record.created_at = created_at;
    record.updated_at = created_at;
    record
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_rejects_duplicate_names() {
        let store = InMemoryJobStore::new();
        store.create("mika").await.unwrap();

        let err = store.create("mika").await.unwrap_err();
        assert!(matches!(err, StoreError::NameTaken(name) if name == "mika"));
    }

    #[tokio::test]
    async fn update_applies_shared_field_semantics() {
        let store = InMemoryJobStore::new();
        let record = store.create("mika").await.unwrap();

        let updated = store
            .update(record.id, JobUpdate::new().status(JobStatus::Queued).queue_position(1))
            .await
            .unwrap();
        assert_eq!(updated.status, JobStatus::Queued);
        assert_eq!(updated.queue_position, Some(1));
        assert!(updated.updated_at >= record.updated_at);
    }

    #[tokio::test]
    async fn list_by_status_orders_by_creation_time() {
        let store = InMemoryJobStore::new();
        let base = Utc::now();
        let older = make_record("older", JobStatus::Queued, base - chrono::Duration::minutes(5));
        let newer = make_record("newer", JobStatus::Queued, base);
        store.insert(newer.clone());
        store.insert(older.clone());

        let listed = store.list_by_status(JobStatus::Queued).await.unwrap();
        assert_eq!(listed[0].id, older.id);
        assert_eq!(listed[1].id, newer.id);
    }

    #[tokio::test]
    async fn worker_helpers_route_through_update() {
        let store = InMemoryJobStore::new();
        let record = store.create("mika").await.unwrap();
        store
            .update(record.id, JobUpdate::new().status(JobStatus::Running))
            .await
            .unwrap();

        store.update_progress(record.id, 42.0).await.unwrap();
        assert_eq!(store.snapshot(record.id).unwrap().progress, 42.0);

        store.record_failure(record.id, "out of VRAM").await.unwrap();
        let failed = store.snapshot(record.id).unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("out of VRAM"));
    }
}
