use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};

use crate::config::SchedulerConfig;
use crate::device::{DeviceId, DeviceSet};
use crate::error::{Result, SchedulerError};
use crate::events::{EventBus, JobEvent, JobEventPayload, ReleaseOutcome};
use crate::job::{JobId, JobStatus, JobUpdate};
use crate::queue::AdmissionQueue;
use crate::store::{JobStore, StoreError};
use crate::telemetry;

/// A committed head-of-queue/device pairing.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub job_id: JobId,
    pub device: DeviceId,
}

/// One running job in a [`QueueStatus`] snapshot.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActiveJob {
    pub job_id: JobId,
    pub character_name: String,
    pub progress: f64,
    pub device: DeviceId,
}

/// Consistent point-in-time view of the queue and device pool.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueueStatus {
    pub sampled_at: DateTime<Utc>,
    pub queue_size: usize,
    pub active: Vec<ActiveJob>,
    pub free_devices: usize,
    pub pool_size: usize,
}

/// What startup recovery rebuilt from the store.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RecoveryReport {
    /// Interrupted `Running` jobs moved back to `Queued`.
    pub requeued_running: usize,
    /// Persisted `Queued` jobs re-admitted to the in-memory queue.
    pub requeued_queued: usize,
}

impl RecoveryReport {
    pub fn total(&self) -> usize {
        self.requeued_running + self.requeued_queued
    }
}

/// Queue and device pool, guarded together.
///
/// One mutex covers both so that dequeueing the head job and binding the
/// device it receives is a single atomic step; splitting the two would let
/// a device be read as free and then double-bound before the queue pop
/// lands.
struct SchedState {
    devices: DeviceSet,
    queue: AdmissionQueue,
}

/// The GPU training-job scheduler.
///
/// Admits submitted jobs into a FIFO [`AdmissionQueue`], pairs queue heads
/// with free devices from a fixed [`DeviceSet`], releases devices when the
/// external training worker finishes, and rebuilds its in-memory state
/// from the [`JobStore`] after a process restart.
///
/// One logical instance exists per process, constructed at the
/// application's composition root with an injected store, and shared by
/// cloning (all clones operate on the same state). Every operation is safe
/// for concurrent invocation from parallel request handlers.
///
/// Persistence discipline: transitions that decide scheduling state
/// (status, device binding, the job's own queue entry) are written inside
/// the critical section, and the in-memory decision is rolled back if the
/// write fails. Mirrored queue positions of *other* jobs are advisory and
/// never roll anything back.
#[derive(Clone)]
pub struct Scheduler {
    store: Arc<dyn JobStore>,
    state: Arc<Mutex<SchedState>>,
    events: EventBus,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Scheduler");
        match self.state.try_lock() {
            Ok(state) => {
                debug
                    .field("pool_size", &state.devices.pool_size())
                    .field("bound_devices", &state.devices.bound_count())
                    .field("queue_depth", &state.queue.len());
            }
            Err(_) => {
                debug.field("state", &"<locked>");
            }
        }
        debug.finish()
    }
}

impl Scheduler {
    pub fn new(config: &SchedulerConfig, store: Arc<dyn JobStore>) -> Self {
        Self {
            store,
            state: Arc::new(Mutex::new(SchedState {
                devices: DeviceSet::new(config.devices.iter().copied()),
                queue: AdmissionQueue::new(),
            })),
            events: EventBus::new(config.event_capacity),
        }
    }

    /// The injected store, for callers that poll job records directly.
    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Subscribe to lifecycle events published after committed transitions.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// Admit a `Pending` job into the queue.
    ///
    /// Sets the job `Queued` with its 1-based position persisted, then
    /// mirrors the positions of all queued jobs. Does not assign a device;
    /// pairing happens on the next [`Scheduler::try_assign`].
    ///
    /// Any job not currently `Pending` is a warning-level no-op: duplicate
    /// submits are expected under retry-prone callers, including retries
    /// that land after the job already reached a terminal status.
    pub async fn submit(&self, job_id: JobId) -> Result<()> {
        let span = telemetry::submit_span(&job_id.to_string());
        async {
            let mut state = self.state.lock().await;

            let record = self
                .store
                .get(job_id)
                .await
                .map_err(|err| Self::map_missing(job_id, err))?;

            match record.status {
                JobStatus::Pending => {}
                JobStatus::Queued | JobStatus::Running => {
                    warn!(%job_id, status = %record.status, "submit ignored: job already admitted");
                    return Ok(());
                }
                JobStatus::Completed | JobStatus::Failed => {
                    warn!(%job_id, status = %record.status, "submit ignored: job already finished");
                    return Ok(());
                }
            }

            if !state.queue.enqueue(job_id) {
                warn!(%job_id, "submit ignored: job already queued in memory");
                return Ok(());
            }
            let position = state.queue.len() as u32;

            let update = JobUpdate::new()
                .status(JobStatus::Queued)
                .queue_position(position);
            if let Err(err) = self.store.update(job_id, update).await {
                state.queue.remove(job_id);
                return Err(Self::map_missing(job_id, err));
            }

            self.recompute_positions_locked(&mut state).await;

            info!(%job_id, position, "job queued");
            telemetry::record_job_submitted();
            self.publish_gauges(&state);
            self.events
                .publish(JobEvent::new(job_id, JobEventPayload::Submitted { position }));
            Ok(())
        }
        .instrument(span)
        .await
    }

    /// Pair the queue head with a free device, if both exist.
    ///
    /// Returns `Ok(None)` when the queue is empty or every device is bound
    /// — an expected, normal outcome for periodic ticks, not an error.
    /// Atomic with respect to concurrent calls: the queue and device pool
    /// are mutated under one lock, so no device is bound twice and no job
    /// is dequeued twice.
    pub async fn try_assign(&self) -> Result<Option<Assignment>> {
        let mut state = self.state.lock().await;
        self.try_assign_locked(&mut state).await
    }

    /// Assign until no further pairing is possible; returns how many jobs
    /// started. This is the body of a scheduling tick.
    pub async fn drain(&self) -> Result<usize> {
        let mut state = self.state.lock().await;
        let mut started = 0;
        while self.try_assign_locked(&mut state).await?.is_some() {
            started += 1;
        }
        Ok(started)
    }

    async fn try_assign_locked(
        &self,
        state: &mut SchedState,
    ) -> Result<Option<Assignment>> {
        loop {
            let Some(device) = state.devices.find_free_device() else {
                return Ok(None);
            };
            let Some(job_id) = state.queue.dequeue() else {
                return Ok(None);
            };

            if let Err(err) = state.devices.bind(device, job_id) {
                debug_assert!(false, "free device {device} failed to bind");
                state.queue.restore_front(job_id);
                return Err(err);
            }

            let update = JobUpdate::new()
                .status(JobStatus::Running)
                .device(device)
                .clear_queue_position();
            match self.store.update(job_id, update).await {
                Ok(_) => {}
                Err(StoreError::NotFound(_)) => {
                    // The record vanished underneath us; drop the queue
                    // entry and offer the device to the next job.
                    warn!(%job_id, "queued job no longer exists, skipping");
                    state.devices.unbind(device);
                    continue;
                }
                Err(err) => {
                    state.devices.unbind(device);
                    state.queue.restore_front(job_id);
                    return Err(err.into());
                }
            }

            self.recompute_positions_locked(state).await;

            info!(%job_id, %device, "job assigned");
            telemetry::record_assignment();
            self.publish_gauges(state);
            self.events
                .publish(JobEvent::new(job_id, JobEventPayload::Assigned { device }));
            return Ok(Some(Assignment { job_id, device }));
        }
    }

    /// Release a device whose job has finished.
    ///
    /// The external worker records the terminal outcome in the store before
    /// signalling release. A job found `Completed` stays completed; any
    /// other status means the device was freed without a completion marker
    /// and the job is forced to `Failed` — a job is never left silently
    /// `Running` with no device. Releasing an already-free device is a
    /// warning-level no-op (duplicate release calls are expected).
    ///
    /// A freed device is immediately reconsidered for the queue head.
    pub async fn release(&self, device: DeviceId) -> Result<()> {
        let span = telemetry::release_span(&device.to_string());
        async {
            let mut state = self.state.lock().await;

            let Some(job_id) = state.devices.unbind(device) else {
                warn!(%device, "release ignored: device not bound");
                return Ok(());
            };

            let outcome = match self.store.get(job_id).await {
                Ok(record) => {
                    let mut update = JobUpdate::new().clear_device();
                    let outcome = if record.status == JobStatus::Completed {
                        ReleaseOutcome::Completed
                    } else {
                        update = update.status(JobStatus::Failed);
                        if record.error_message.is_none() {
                            update = update
                                .error_message("device released before completion");
                        }
                        ReleaseOutcome::Failed
                    };
                    match self.store.update(job_id, update).await {
                        Ok(_) => outcome,
                        Err(StoreError::NotFound(_)) => {
                            warn!(%job_id, %device, "released job no longer exists");
                            ReleaseOutcome::Failed
                        }
                        Err(err) => {
                            // Keep memory consistent with what was durably
                            // recorded: the job is still Running on disk.
                            let _ = state.devices.bind(device, job_id);
                            return Err(err.into());
                        }
                    }
                }
                Err(StoreError::NotFound(_)) => {
                    warn!(%job_id, %device, "released job no longer exists");
                    ReleaseOutcome::Failed
                }
                Err(err) => {
                    let _ = state.devices.bind(device, job_id);
                    return Err(err.into());
                }
            };

            info!(%job_id, %device, outcome = outcome.as_str(), "device released");
            telemetry::record_release(outcome.as_str());
            self.publish_gauges(&state);
            self.events.publish(JobEvent::new(
                job_id,
                JobEventPayload::Released { device, outcome },
            ));

            // Offer the freed device to the queue head right away. A store
            // failure here leaves the job queued; the next tick retries.
            if let Err(err) = self.try_assign_locked(&mut state).await {
                warn!(error = %err, "post-release assignment failed");
            }
            Ok(())
        }
        .instrument(span)
        .await
    }

    /// Current queue depth, running jobs per device, and free-device count.
    ///
    /// Taken under the scheduler lock, so no queue/device pairing is ever
    /// observed mid-transition.
    pub async fn queue_status(&self) -> Result<QueueStatus> {
        let state = self.state.lock().await;

        let mut active = Vec::with_capacity(state.devices.bound_count());
        let bindings: Vec<_> = state.devices.bindings().collect();
        for (device, job_id) in bindings {
            match self.store.get(job_id).await {
                Ok(record) => active.push(ActiveJob {
                    job_id,
                    character_name: record.character_name,
                    progress: record.progress,
                    device,
                }),
                Err(StoreError::NotFound(_)) => continue,
                Err(err) => return Err(err.into()),
            }
        }

        Ok(QueueStatus {
            sampled_at: Utc::now(),
            queue_size: state.queue.len(),
            active,
            free_devices: state.devices.free_count(),
            pool_size: state.devices.pool_size(),
        })
    }

    /// Rebuild queue membership and order from persisted job records.
    ///
    /// Called once at startup, before new submissions are accepted. Device
    /// bindings are process-local and do not survive a restart, so every
    /// job found `Running` lost its work: it is moved back to `Queued`
    /// with its device cleared and re-admitted oldest-first. Persisted
    /// `Queued` jobs not already re-admitted follow, again oldest-first.
    /// No devices are bound afterwards; the first tick fills the pool from
    /// the rebuilt queue.
    ///
    /// Idempotent: a partial run (e.g. aborted by a store failure) can be
    /// retried without duplicating queue entries.
    pub async fn recover(&self) -> Result<RecoveryReport> {
        let span = telemetry::recovery_span();
        async {
            let mut state = self.state.lock().await;
            let mut report = RecoveryReport::default();

            let mut interrupted = self.store.list_by_status(JobStatus::Running).await?;
            interrupted.sort_by_key(|record| record.created_at);
            for record in interrupted {
                info!(job_id = %record.id, name = %record.character_name, "recovering interrupted job");
                if !state.queue.enqueue(record.id) {
                    continue;
                }
                let update = JobUpdate::new()
                    .status(JobStatus::Queued)
                    .clear_device();
                match self.store.update(record.id, update).await {
                    Ok(_) => {
                        report.requeued_running += 1;
                        self.events
                            .publish(JobEvent::new(record.id, JobEventPayload::Requeued));
                    }
                    Err(StoreError::NotFound(_)) => {
                        state.queue.remove(record.id);
                    }
                    Err(err) => {
                        state.queue.remove(record.id);
                        return Err(err.into());
                    }
                }
            }

            let mut waiting = self.store.list_by_status(JobStatus::Queued).await?;
            waiting.sort_by_key(|record| record.created_at);
            for record in waiting {
                // Jobs re-queued above already sit in the queue; the
                // idempotent enqueue skips them.
                if state.queue.enqueue(record.id) {
                    report.requeued_queued += 1;
                }
            }

            self.recompute_positions_locked(&mut state).await;
            self.publish_gauges(&state);

            info!(
                requeued_running = report.requeued_running,
                requeued_queued = report.requeued_queued,
                queue_depth = state.queue.len(),
                "recovery complete"
            );
            Ok(report)
        }
        .instrument(span)
        .await
    }

    /// Mirror the in-memory queue order into the store's `queue_position`
    /// column. The persisted ranks are an advisory cache for external
    /// readers; a failed write here is logged and never rolls back the
    /// in-memory order.
    async fn recompute_positions_locked(&self, state: &mut SchedState) {
        let ranked: Vec<_> = state.queue.iter_ranked().collect();
        for (job_id, rank) in ranked {
            let update = JobUpdate::new().queue_position(rank);
            match self.store.update(job_id, update).await {
                Ok(_) => {}
                Err(StoreError::NotFound(_)) => {
                    debug!(%job_id, "skipping position mirror for missing job");
                }
                Err(err) => {
                    warn!(%job_id, rank, error = %err, "failed to mirror queue position");
                }
            }
        }
    }

    fn publish_gauges(&self, state: &SchedState) {
        telemetry::set_queue_depth(state.queue.len());
        telemetry::set_devices_busy(state.devices.bound_count());
    }

    fn map_missing(job_id: JobId, err: StoreError) -> SchedulerError {
        match err {
            StoreError::NotFound(_) => SchedulerError::JobNotFound(job_id),
            other => SchedulerError::Store(other),
        }
    }

    /// Spawn a periodic scheduling tick driving [`Scheduler::drain`].
    ///
    /// The tick is a safety net behind the reactive triggers (`release`
    /// reconsiders its freed device immediately): it picks up work whose
    /// reactive assignment hit a transient store failure. Cancel via the
    /// returned token; the task exits after the in-flight tick.
    pub fn spawn_ticker(&self, period: Duration) -> (JoinHandle<()>, ShutdownToken) {
        let scheduler = self.clone();
        let token = ShutdownToken::new();
        let shutdown = token.clone();
        let handle = tokio::spawn(async move {
            let mut tick = tokio::time::interval(period);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tick.tick() => {
                        match scheduler.drain().await {
                            Ok(started) if started > 0 => {
                                debug!(started, "scheduling tick assigned jobs");
                            }
                            Ok(_) => {}
                            Err(err) => {
                                warn!(error = %err, "scheduling tick failed");
                            }
                        }
                    }
                }
            }
        });
        (handle, token)
    }
}

/// Cooperative shutdown signal for the scheduling ticker.
#[derive(Clone, Debug, Default)]
pub struct ShutdownToken {
    inner: Arc<ShutdownTokenInner>,
}

#[derive(Debug, Default)]
struct ShutdownTokenInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Check if cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Wait until cancelled.
    ///
    /// The waiter is registered before the flag is re-checked, so a
    /// `cancel` racing with this call cannot slip between the check and
    /// the wait and leave the future sleeping.
    pub async fn cancelled(&self) {
        let mut notified = std::pin::pin!(self.inner.notify.notified());
        loop {
            if self.is_cancelled() {
                return;
            }
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.as_mut().await;
            notified.set(self.inner.notify.notified());
        }
    }
}
