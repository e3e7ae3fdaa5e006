//! Benchmarks for admission-path operations using criterion.
//!
//! These benchmarks measure the performance of the scheduler hot paths:
//! - Single job submit
//! - Batch submit (100 jobs)
//! - Assignment latency with a backlog
//! - Full lifecycle (submit → assign → release)
//! - Queue status snapshots at varying queue depths

#![allow(missing_docs)]

use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use kiln::{DeviceId, JobStatus, JobStore, JobUpdate, Scheduler, SchedulerConfig};
use kiln_testkit::InMemoryJobStore;
use tokio::runtime::Runtime;

/// Creates a tokio runtime for async benchmarks.
fn create_runtime() -> Runtime {
    Runtime::new().expect("Failed to create tokio runtime")
}

fn make_scheduler(devices: &[u16], store: &InMemoryJobStore) -> Scheduler {
    let config = SchedulerConfig::with_devices(devices.iter().map(|id| DeviceId(*id)));
    Scheduler::new(&config, Arc::new(store.clone()))
}

/// Benchmark: Submit a single job.
///
/// Measures the latency of admitting one pending job into the queue.
fn bench_submit_single(c: &mut Criterion) {
    let rt = create_runtime();

    let mut group = c.benchmark_group("submit_single");
    group.sample_size(100);

    group.bench_function("in_memory", |b| {
        let store = InMemoryJobStore::new();
        let scheduler = make_scheduler(&[0], &store);
        let mut counter = 0u64;

        b.to_async(&rt).iter(|| {
            counter += 1;
            let name = format!("bench-{counter}");
            let store = store.clone();
            let scheduler = scheduler.clone();
            async move {
                let record = store.create(&name).await.expect("create should succeed");
                scheduler
                    .submit(record.id)
                    .await
                    .expect("submit should succeed");
            }
        });
    });

    group.finish();
}

/// Benchmark: Submit 100 jobs back to back.
///
/// Position mirroring is O(queue) per submit, so this captures the
/// quadratic tail of a deep backlog.
fn bench_submit_batch(c: &mut Criterion) {
    let rt = create_runtime();

    let mut group = c.benchmark_group("submit_batch");
    group.sample_size(20);
    group.throughput(Throughput::Elements(100));

    group.bench_function("in_memory_100", |b| {
        b.to_async(&rt).iter(|| async {
            let store = InMemoryJobStore::new();
            let scheduler = make_scheduler(&[0], &store);
            for index in 0..100 {
                let record = store
                    .create(&format!("bench-{index}"))
                    .await
                    .expect("create should succeed");
                scheduler
                    .submit(record.id)
                    .await
                    .expect("submit should succeed");
            }
        });
    });

    group.finish();
}

/// Benchmark: Full lifecycle on a single device.
///
/// submit → try_assign → complete → release, including the reactive
/// re-assignment release performs.
fn bench_lifecycle(c: &mut Criterion) {
    let rt = create_runtime();

    let mut group = c.benchmark_group("lifecycle");
    group.sample_size(50);

    group.bench_function("submit_assign_release", |b| {
        let mut counter = 0u64;

        b.to_async(&rt).iter(|| {
            counter += 1;
            let name = format!("bench-{counter}");
            async move {
                let store = InMemoryJobStore::new();
                let scheduler = make_scheduler(&[0], &store);
                let record = store.create(&name).await.expect("create should succeed");
                scheduler
                    .submit(record.id)
                    .await
                    .expect("submit should succeed");
                let assignment = scheduler
                    .try_assign()
                    .await
                    .expect("assign should succeed")
                    .expect("device should be free");
                store
                    .update(
                        assignment.job_id,
                        JobUpdate::new().status(JobStatus::Completed),
                    )
                    .await
                    .expect("update should succeed");
                scheduler
                    .release(assignment.device)
                    .await
                    .expect("release should succeed");
            }
        });
    });

    group.finish();
}

/// Benchmark: Queue status snapshot at varying depths.
///
/// queue_status re-reads every bound job from the store, so depth here
/// means bound devices, not queue length.
fn bench_queue_status(c: &mut Criterion) {
    let rt = create_runtime();

    let mut group = c.benchmark_group("queue_status");
    group.sample_size(100);

    for queue_depth in [0usize, 10, 100] {
        group.bench_with_input(
            BenchmarkId::new("depth", queue_depth),
            &queue_depth,
            |b, &depth| {
                let store = InMemoryJobStore::new();
                let scheduler = make_scheduler(&[0, 1, 2], &store);

                rt.block_on(async {
                    for index in 0..depth {
                        let record = store
                            .create(&format!("bench-{index}"))
                            .await
                            .expect("create should succeed");
                        scheduler
                            .submit(record.id)
                            .await
                            .expect("submit should succeed");
                    }
                    scheduler.drain().await.expect("drain should succeed");
                });

                let scheduler = scheduler.clone();
                b.to_async(&rt).iter(|| {
                    let scheduler = scheduler.clone();
                    async move {
                        let _ = scheduler
                            .queue_status()
                            .await
                            .expect("queue_status should succeed");
                    }
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_submit_single,
    bench_submit_batch,
    bench_lifecycle,
    bench_queue_status
);
criterion_main!(benches);
