use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::device::DeviceId;
use crate::job::JobId;

/// How a device release left its job.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseOutcome {
    /// The worker had marked the job `Completed` before releasing.
    Completed,
    /// The device was freed without a completion marker; the job was
    /// forced to `Failed`.
    Failed,
}

impl ReleaseOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReleaseOutcome::Completed => "completed",
            ReleaseOutcome::Failed => "failed",
        }
    }
}

/// Lifecycle event published after a committed scheduler transition.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobEvent {
    pub job_id: JobId,
    pub at: DateTime<Utc>,
    pub payload: JobEventPayload,
}

impl JobEvent {
    pub fn new(job_id: JobId, payload: JobEventPayload) -> Self {
        Self {
            job_id,
            at: Utc::now(),
            payload,
        }
    }
}

/// Payload of a [`JobEvent`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[non_exhaustive]
pub enum JobEventPayload {
    /// Job admitted into the queue at the given 1-based position.
    Submitted { position: u32 },
    /// Job paired with a free device and moved to `Running`.
    Assigned { device: DeviceId },
    /// Interrupted job re-queued during startup recovery.
    Requeued,
    /// Device released; the job reached the given terminal outcome.
    Released {
        device: DeviceId,
        outcome: ReleaseOutcome,
    },
}

/// In-process, fan-out event bus over a tokio broadcast channel.
///
/// Publishing never blocks: subscribers that fall behind observe
/// `RecvError::Lagged` and skip ahead, and publishing with no subscribers
/// is a no-op. Events are advisory — scheduler state transitions are
/// already committed when their event is published.
#[derive(Clone, Debug)]
pub struct EventBus {
    sender: broadcast::Sender<JobEvent>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Broadcast an event to all current subscribers.
    pub fn publish(&self, event: JobEvent) {
        // Err means no live subscribers, which is fine.
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fan_out_to_multiple_subscribers() {
        let bus = EventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        let job_id = JobId::new();
        bus.publish(JobEvent::new(
            job_id,
            JobEventPayload::Assigned { device: DeviceId(0) },
        ));

        let event1 = rx1.recv().await.unwrap();
        let event2 = rx2.recv().await.unwrap();
        assert_eq!(event1.job_id, job_id);
        assert_eq!(event2.job_id, job_id);
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_a_no_op() {
        let bus = EventBus::new(4);
        bus.publish(JobEvent::new(JobId::new(), JobEventPayload::Requeued));
        assert_eq!(bus.subscriber_count(), 0);
    }
}
