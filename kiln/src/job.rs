use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use uuid::Uuid;

use crate::device::DeviceId;

/// Unique identifier of a training job.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of a training job.
///
/// Transitions are monotonic (`Pending → Queued → Running → Completed | Failed`)
/// with one exception: startup recovery moves interrupted `Running` jobs back
/// to `Queued`, since an in-progress training run cannot be resumed and must
/// be restarted from scratch.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Whether the status is terminal (no further transitions).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable record of one character-training job.
///
/// The scheduler is the sole writer of `status`, `device`, and
/// `queue_position`. The training worker writes `progress` and
/// `error_message`, but only while the scheduler has the job `Running`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    /// Human-chosen character name; unique across all jobs.
    pub character_name: String,
    pub status: JobStatus,
    /// Training progress in `[0.0, 100.0]`; only meaningful while `Running`.
    pub progress: f64,
    /// Device the job is bound to; set only while `Running`.
    pub device: Option<DeviceId>,
    /// 1-based FIFO rank; set only while `Queued`.
    pub queue_position: Option<u32>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Fresh `Pending` record, as `JobStore::create` initializes it.
    pub fn new(character_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            character_name: character_name.into(),
            status: JobStatus::Pending,
            progress: 0.0,
            device: None,
            queue_position: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }
}

/// Partial update of a [`JobRecord`].
///
/// Unset fields leave the record unchanged. `device` and `queue_position`
/// distinguish "set to a value", "clear", and "leave alone", so the
/// scheduler can drop a device binding without touching anything else.
#[derive(Clone, Debug, Default)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub progress: Option<f64>,
    pub device: Option<Option<DeviceId>>,
    pub queue_position: Option<Option<u32>>,
    pub error_message: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn progress(mut self, progress: f64) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn device(mut self, device: DeviceId) -> Self {
        self.device = Some(Some(device));
        self
    }

    pub fn clear_device(mut self) -> Self {
        self.device = Some(None);
        self
    }

    pub fn queue_position(mut self, position: u32) -> Self {
        self.queue_position = Some(Some(position));
        self
    }

    pub fn clear_queue_position(mut self) -> Self {
        self.queue_position = Some(None);
        self
    }

    pub fn error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    pub fn completed_at(mut self, at: DateTime<Utc>) -> Self {
        self.completed_at = Some(at);
        self
    }

    /// True when no field is set.
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.progress.is_none()
            && self.device.is_none()
            && self.queue_position.is_none()
            && self.error_message.is_none()
            && self.completed_at.is_none()
    }

    /// Apply this update to a record, refreshing `updated_at`.
    ///
    /// Shared by every `JobStore` implementation so the field semantics stay
    /// identical across backends: progress is clamped to `[0.0, 100.0]` and
    /// never regresses while the job is `Running`; `completed_at` is set at
    /// most once, automatically when the status reaches `Completed`.
    pub fn apply(&self, record: &mut JobRecord, now: DateTime<Utc>) {
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(progress) = self.progress {
            let clamped = progress.clamp(0.0, 100.0);
            record.progress = if record.status == JobStatus::Running {
                record.progress.max(clamped)
            } else {
                clamped
            };
        }
        if let Some(device) = self.device {
            record.device = device;
        }
        if let Some(position) = self.queue_position {
            record.queue_position = position;
        }
        if let Some(ref message) = self.error_message {
            record.error_message = Some(message.clone());
        }
        if record.completed_at.is_none() {
            if let Some(at) = self.completed_at {
                record.completed_at = Some(at);
            } else if record.status == JobStatus::Completed {
                record.completed_at = Some(now);
            }
        }
        record.updated_at = now;
    }
}
