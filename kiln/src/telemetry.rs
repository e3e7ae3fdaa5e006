//! Tracing and telemetry instrumentation for kiln.
//!
//! Helper functions for creating tracing spans around scheduler operations
//! and for recording metrics during job lifecycle transitions. The metric
//! helpers are no-ops unless the `metrics` feature is enabled, so call
//! sites never need feature gates.

use tracing::{info_span, Span};

/// Create a tracing span for a job submission.
#[must_use]
pub fn submit_span(job_id: impl AsRef<str>) -> Span {
    info_span!(
        "kiln.submit",
        job_id = %job_id.as_ref(),
    )
}

/// Create a tracing span for a device release.
#[must_use]
pub fn release_span(device: impl AsRef<str>) -> Span {
    info_span!(
        "kiln.release",
        device = %device.as_ref(),
    )
}

/// Create a tracing span for startup recovery.
#[must_use]
pub fn recovery_span() -> Span {
    info_span!("kiln.recover")
}

/// Record that a job was admitted to the queue.
pub fn record_job_submitted() {
    #[cfg(feature = "metrics")]
    crate::metrics::record_job_submitted();
}

/// Record that a job was paired with a device.
pub fn record_assignment() {
    #[cfg(feature = "metrics")]
    crate::metrics::record_assignment();
}

/// Record a device release with its terminal outcome.
pub fn record_release(outcome: &str) {
    #[cfg(feature = "metrics")]
    crate::metrics::record_release(outcome);
    #[cfg(not(feature = "metrics"))]
    let _ = outcome;
}

/// Update the queue-depth gauge.
pub fn set_queue_depth(depth: usize) {
    #[cfg(feature = "metrics")]
    crate::metrics::set_queue_depth(depth as f64);
    #[cfg(not(feature = "metrics"))]
    let _ = depth;
}

/// Update the busy-devices gauge.
pub fn set_devices_busy(busy: usize) {
    #[cfg(feature = "metrics")]
    crate::metrics::set_devices_busy(busy as f64);
    #[cfg(not(feature = "metrics"))]
    let _ = busy;
}
