//! Prometheus metrics instrumentation for kiln.
//!
//! All metrics are conditionally compiled behind the `metrics` feature
//! flag; `telemetry` provides no-op shims when the feature is off.
//!
//! # Metrics
//!
//! ## Counters
//! - `kiln_jobs_submitted_total` - Jobs admitted to the queue
//! - `kiln_assignments_total` - Jobs paired with a device
//! - `kiln_releases_total` - Devices released, labeled by outcome
//!
//! ## Gauges
//! - `kiln_queue_depth` - Jobs currently awaiting a device
//! - `kiln_devices_busy` - Devices currently bound to a job
#![cfg(feature = "metrics")]

use prometheus::{IntCounter, IntCounterVec, Gauge, Opts, Registry};
use std::sync::LazyLock;

/// Global Prometheus registry for kiln metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Counter for jobs admitted to the queue.
pub static JOBS_SUBMITTED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "kiln_jobs_submitted_total",
        "Total number of jobs admitted to the queue",
    )
    .expect("kiln_jobs_submitted_total metric creation failed")
});

/// Counter for jobs paired with a device.
pub static ASSIGNMENTS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "kiln_assignments_total",
        "Total number of jobs paired with a device",
    )
    .expect("kiln_assignments_total metric creation failed")
});

/// Counter for device releases.
///
/// Labels:
/// - `outcome`: the job's terminal status at release (completed, failed)
pub static RELEASES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    let opts = Opts::new("kiln_releases_total", "Total number of device releases");
    IntCounterVec::new(opts, &["outcome"])
        .expect("kiln_releases_total metric creation failed")
});

/// Gauge for the number of jobs awaiting a device.
pub static QUEUE_DEPTH: LazyLock<Gauge> = LazyLock::new(|| {
    Gauge::new("kiln_queue_depth", "Jobs currently awaiting a device")
        .expect("kiln_queue_depth metric creation failed")
});

/// Gauge for the number of devices bound to a job.
pub static DEVICES_BUSY: LazyLock<Gauge> = LazyLock::new(|| {
    Gauge::new("kiln_devices_busy", "Devices currently bound to a job")
        .expect("kiln_devices_busy metric creation failed")
});

/// Initialize all metrics by registering them with the global registry.
///
/// This function is idempotent - calling it multiple times is safe.
pub fn init_metrics() -> anyhow::Result<()> {
    let registry = &*REGISTRY;

    for metric in [
        Box::new(JOBS_SUBMITTED_TOTAL.clone()) as Box<dyn prometheus::core::Collector>,
        Box::new(ASSIGNMENTS_TOTAL.clone()),
        Box::new(RELEASES_TOTAL.clone()),
        Box::new(QUEUE_DEPTH.clone()),
        Box::new(DEVICES_BUSY.clone()),
    ] {
        if let Err(e) = registry.register(metric) {
            let msg = e.to_string();
            if !msg.contains("Duplicate metrics collector registration attempted") {
                return Err(e.into());
            }
        }
    }

    Ok(())
}

/// Helper to record a job admission.
pub fn record_job_submitted() {
    JOBS_SUBMITTED_TOTAL.inc();
}

/// Helper to record a job/device pairing.
pub fn record_assignment() {
    ASSIGNMENTS_TOTAL.inc();
}

/// Helper to record a device release by outcome.
pub fn record_release(outcome: &str) {
    RELEASES_TOTAL.with_label_values(&[outcome]).inc();
}

/// Helper to update the queue depth gauge.
pub fn set_queue_depth(depth: f64) {
    QUEUE_DEPTH.set(depth);
}

/// Helper to update the busy devices gauge.
pub fn set_devices_busy(busy: f64) {
    DEVICES_BUSY.set(busy);
}

/// Gather all registered metrics in Prometheus text format.
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    encoder
        .encode_to_string(&metric_families)
        .map_err(Into::into)
}
