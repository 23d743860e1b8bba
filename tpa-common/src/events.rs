//! Event types for the TPA event system
//!
//! Events are broadcast via [`EventBus`] and serialized for SSE transmission.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::JobStatus;

/// TPA event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TpaEvent {
    /// Measurement file accepted and its metadata persisted
    FileIngested {
        file_id: Uuid,
        filename: String,
        /// Declared kind (`csv`, `xlsx`, `mat`, `h5`)
        file_type: String,
        timestamp: DateTime<Utc>,
    },

    /// File record and its stored bytes removed
    FileDeleted {
        file_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// Analysis job created in PENDING state
    JobSubmitted {
        job_id: Uuid,
        name: String,
        timestamp: DateTime<Utc>,
    },

    /// Job status transition applied
    ///
    /// Only emitted for transitions that actually won the conditional update;
    /// superseded writes produce no event.
    JobStatusChanged {
        job_id: Uuid,
        old_status: JobStatus,
        new_status: JobStatus,
        /// Error message for FAILED transitions
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error_message: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// Timeout supervisor forced a RUNNING job to FAILED
    JobTimedOut {
        job_id: Uuid,
        deadline_seconds: u64,
        timestamp: DateTime<Utc>,
    },
}

impl TpaEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            TpaEvent::FileIngested { .. } => "FileIngested",
            TpaEvent::FileDeleted { .. } => "FileDeleted",
            TpaEvent::JobSubmitted { .. } => "JobSubmitted",
            TpaEvent::JobStatusChanged { .. } => "JobStatusChanged",
            TpaEvent::JobTimedOut { .. } => "JobTimedOut",
        }
    }

    /// Job this event refers to, if any
    pub fn job_id(&self) -> Option<Uuid> {
        match self {
            TpaEvent::JobSubmitted { job_id, .. }
            | TpaEvent::JobStatusChanged { job_id, .. }
            | TpaEvent::JobTimedOut { job_id, .. } => Some(*job_id),
            TpaEvent::FileIngested { .. } | TpaEvent::FileDeleted { .. } => None,
        }
    }
}

/// Broadcast bus for [`TpaEvent`]s
///
/// Cloning shares the underlying channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<TpaEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// * `capacity` - Number of events to buffer before lagging receivers drop old events
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<TpaEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: TpaEvent) -> Result<usize, broadcast::error::SendError<TpaEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: TpaEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_receives_emitted_event() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();
        let job_id = Uuid::new_v4();

        bus.emit(TpaEvent::JobStatusChanged {
            job_id,
            old_status: JobStatus::Pending,
            new_status: JobStatus::Running,
            error_message: None,
            timestamp: Utc::now(),
        })
        .unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "JobStatusChanged");
        assert_eq!(event.job_id(), Some(job_id));
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new(10);
        let event = TpaEvent::FileDeleted {
            file_id: Uuid::new_v4(),
            timestamp: Utc::now(),
        };
        assert!(bus.emit(event.clone()).is_err());
        bus.emit_lossy(event);
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.capacity(), 10);
    }

    #[test]
    fn test_serialized_event_is_tagged() {
        let event = TpaEvent::JobTimedOut {
            job_id: Uuid::nil(),
            deadline_seconds: 300,
            timestamp: Utc::now(),
        };
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "JobTimedOut");
        assert_eq!(json["deadline_seconds"], 300);
    }
}
