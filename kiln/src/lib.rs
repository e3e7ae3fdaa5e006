//! Kiln - GPU training-job scheduler for character training.
//!
//! A small scheduling core that admits character-training jobs onto a
//! fixed pool of GPU devices, tracks their lifecycle, recovers state after
//! a process restart, and reports queue/progress status to polling
//! clients.
//!
//! # Core Concepts
//!
//! - **Job**: One character-training run, tracked from submission to a
//!   terminal state via [`JobRecord`] and [`JobStatus`].
//!
//! - **JobStore**: The [`JobStore`] trait abstracts the durable record
//!   store. The scheduler owns status/device/position writes; the
//!   external training worker reports progress and errors through the
//!   same contract.
//!
//! - **DeviceSet**: Fixed enumeration of schedulable GPUs with their
//!   busy/free state. Binding state is process-local and rebuilt empty on
//!   restart.
//!
//! - **AdmissionQueue**: FIFO order of jobs awaiting a device, with
//!   1-based position tracking mirrored into the store for pollers.
//!
//! - **Scheduler**: The coordinator: [`Scheduler::submit`] admits work,
//!   [`Scheduler::try_assign`] pairs queue heads with free devices,
//!   [`Scheduler::release`] frees devices on completion/failure, and
//!   [`Scheduler::recover`] rebuilds queue state from persisted records
//!   at startup.
//!
//! # Feature Flags
//!
//! - `postgres` - PostgreSQL job store via sqlx
//! - `metrics` - Prometheus metrics support
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use kiln::{Scheduler, SchedulerConfig};
//!
//! let store = Arc::new(my_job_store);
//! let scheduler = Scheduler::new(&SchedulerConfig::default(), store);
//!
//! scheduler.recover().await?;
//! let job = scheduler.store().create("mika").await?;
//! scheduler.submit(job.id).await?;
//! scheduler.drain().await?;
//! ```

/// Scheduler configuration: device pool and persistence settings.
pub mod config;

/// GPU device identifiers and the fixed pool with its bindings.
pub mod device;

/// Error types for scheduler operations.
pub mod error;

/// Lifecycle event types and the in-process event bus.
pub mod events;

/// Job identity, status, records, and partial updates.
pub mod job;

/// FIFO admission queue with idempotent enqueue and position tracking.
pub mod queue;

/// The scheduling core: submission, assignment, release, and recovery.
pub mod scheduler;

/// The durable job-record contract and its error type.
pub mod store;

/// Tracing spans and metric recording helpers.
pub mod telemetry;

#[cfg(feature = "metrics")]
/// Prometheus metrics, enabled by the `metrics` feature.
pub mod metrics;

#[cfg(feature = "postgres")]
/// PostgreSQL persistence, enabled by the `postgres` feature.
pub mod persistence;

pub use config::*;
pub use device::*;
pub use error::{Result, SchedulerError};
pub use events::*;
pub use job::*;
pub use queue::*;
pub use scheduler::*;
pub use store::*;
