//! End-to-end training flow example.
//!
//! This example drives the scheduler with the in-memory store from
//! kiln-testkit: three character jobs are submitted onto a two-device
//! pool, workers report progress, and releases pull the backlog through.

use std::sync::Arc;
use std::time::Duration;

use kiln::{
    DeviceId, JobStatus, JobStore, JobUpdate, Scheduler, SchedulerConfig,
};
use kiln_testkit::InMemoryJobStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let store = InMemoryJobStore::new();
    let config = SchedulerConfig::with_devices([DeviceId(0), DeviceId(4)]);
    let scheduler = Scheduler::new(&config, Arc::new(store.clone()));

    // Watch the lifecycle events as they happen.
    let mut events = scheduler.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            println!("[EVENT] {:?}", event.payload);
        }
    });

    // Submit three characters; only two devices, so one waits.
    for name in ["mika", "rin", "sayo"] {
        let record = store.create(name).await?;
        scheduler.submit(record.id).await?;
        println!("[SUBMIT] {} -> {}", name, record.id);
    }

    let started = scheduler.drain().await?;
    println!("[DRAIN] started {started} jobs");

    // Simulate the workers: progress updates, then one success and one
    // crash (released without a completion marker).
    let status = scheduler.queue_status().await?;
    for active in &status.active {
        for progress in [25.0, 60.0, 90.0] {
            store.update_progress(active.job_id, progress).await?;
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    let winner = &status.active[0];
    store
        .update(
            winner.job_id,
            JobUpdate::new().status(JobStatus::Completed).progress(100.0),
        )
        .await?;
    scheduler.release(winner.device).await?;
    println!("[RELEASE] {} finished on {}", winner.character_name, winner.device);

    let casualty = &status.active[1];
    scheduler.release(casualty.device).await?;
    println!(
        "[RELEASE] {} lost its device, marked failed",
        casualty.character_name
    );

    // The waiting job took over one of the freed devices.
    let status = scheduler.queue_status().await?;
    println!(
        "[STATUS] {}",
        serde_json::to_string_pretty(&status)?
    );

    Ok(())
}
