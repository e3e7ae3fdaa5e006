//! Startup recovery tests: rebuilding queue state from persisted records.

use std::sync::Arc;

use chrono::{Duration, Utc};
use kiln::{DeviceId, JobStatus, Scheduler, SchedulerConfig};
use kiln_testkit::{make_record, InMemoryJobStore};

fn scheduler_with(devices: &[u16], store: &InMemoryJobStore) -> Scheduler {
    let config = SchedulerConfig::with_devices(devices.iter().map(|id| DeviceId(*id)));
    Scheduler::new(&config, Arc::new(store.clone()))
}

#[tokio::test]
async fn recovery_requeues_interrupted_then_queued_jobs_oldest_first() {
    let store = InMemoryJobStore::new();
    let base = Utc::now();

    // Pre-crash store: A was running on a device, B was queued, C finished.
    let mut a = make_record("a", JobStatus::Running, base - Duration::minutes(10));
    a.device = Some(DeviceId(4));
    a.progress = 55.0;
    let b = make_record("b", JobStatus::Queued, base - Duration::minutes(5));
    let mut c = make_record("c", JobStatus::Completed, base - Duration::minutes(20));
    c.completed_at = Some(base - Duration::minutes(15));
    store.insert(a.clone());
    store.insert(b.clone());
    store.insert(c.clone());

    let scheduler = scheduler_with(&[0, 4], &store);
    let report = scheduler.recover().await.unwrap();
    assert_eq!(report.requeued_running, 1);
    assert_eq!(report.requeued_queued, 1);

    // A lost its work: back to Queued, device cleared, ahead of B.
    let a_record = store.snapshot(a.id).unwrap();
    assert_eq!(a_record.status, JobStatus::Queued);
    assert_eq!(a_record.device, None);
    assert_eq!(a_record.queue_position, Some(1));
    assert_eq!(store.snapshot(b.id).unwrap().queue_position, Some(2));

    // Terminal jobs are untouched.
    assert_eq!(store.snapshot(c.id).unwrap().status, JobStatus::Completed);

    // No devices are pre-bound; the first tick fills the pool.
    let status = scheduler.queue_status().await.unwrap();
    assert_eq!(status.free_devices, 2);
    assert_eq!(status.queue_size, 2);
    assert!(status.active.is_empty());

    assert_eq!(scheduler.drain().await.unwrap(), 2);
    assert_eq!(store.snapshot(a.id).unwrap().status, JobStatus::Running);
    assert_eq!(store.snapshot(b.id).unwrap().status, JobStatus::Running);
}

#[tokio::test]
async fn interrupted_jobs_are_ordered_by_creation_time() {
    let store = InMemoryJobStore::new();
    let base = Utc::now();

    let newer = make_record("newer", JobStatus::Running, base);
    let older = make_record("older", JobStatus::Running, base - Duration::hours(1));
    // Insertion order deliberately disagrees with creation order.
    store.insert(newer.clone());
    store.insert(older.clone());

    let scheduler = scheduler_with(&[0], &store);
    scheduler.recover().await.unwrap();

    assert_eq!(store.snapshot(older.id).unwrap().queue_position, Some(1));
    assert_eq!(store.snapshot(newer.id).unwrap().queue_position, Some(2));

    let assignment = scheduler.try_assign().await.unwrap().unwrap();
    assert_eq!(assignment.job_id, older.id);
}

#[tokio::test]
async fn recovery_is_idempotent() {
    let store = InMemoryJobStore::new();
    let base = Utc::now();
    store.insert(make_record("a", JobStatus::Running, base - Duration::minutes(2)));
    store.insert(make_record("b", JobStatus::Queued, base - Duration::minutes(1)));

    let scheduler = scheduler_with(&[0], &store);
    let first = scheduler.recover().await.unwrap();
    assert_eq!(first.total(), 2);

    // A second pass finds everything already admitted.
    let second = scheduler.recover().await.unwrap();
    assert_eq!(second.total(), 0);

    let status = scheduler.queue_status().await.unwrap();
    assert_eq!(status.queue_size, 2);
}

#[tokio::test]
async fn recovery_with_empty_store_is_a_no_op() {
    let store = InMemoryJobStore::new();
    let scheduler = scheduler_with(&[0, 4, 7], &store);

    let report = scheduler.recover().await.unwrap();
    assert_eq!(report.total(), 0);

    let status = scheduler.queue_status().await.unwrap();
    assert_eq!(status.queue_size, 0);
    assert_eq!(status.free_devices, 3);
}
