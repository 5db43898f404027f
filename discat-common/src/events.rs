//! Status event types and the in-process event bus
//!
//! Each read session emits an ordered series of `StatusEvent`s, one per
//! milestone. Delivery to subscribers is best-effort and at-most-once:
//! the bus never blocks or fails the pipeline that emits on it. Subscribers
//! that need the external broker forward these events across that boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// One published status message for a read session.
///
/// `sequence` increases monotonically within a session; subscribers can use
/// it to detect drops (delivery is unacknowledged).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEvent {
    pub session_id: Uuid,
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub milestone: Milestone,
}

/// Named points in the read pipeline that trigger a status event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Milestone {
    /// Read session accepted and launching the tool
    SessionStarted { device_path: String },

    /// Tool subprocess started and producing output
    ToolConnected,

    /// First fragment seen for a title index
    TitleDiscovered { title_index: u16 },

    /// First fragment seen for a stream within a title
    StreamDiscovered { title_index: u16, stream_index: u16 },

    /// Tool progress update (fractions in 0.0..=1.0)
    Progress {
        operation: String,
        current_fraction: f64,
        total_fraction: f64,
    },

    /// Tool output fully consumed and assembled into a disc graph
    ParseComplete { title_count: usize },

    /// Catalog commit finished for this session
    CommitComplete {
        fingerprint: String,
        generation: i64,
        read_status: String,
    },

    /// Session reached a terminal failure state
    SessionFailed { reason: String },
}

impl Milestone {
    /// Get milestone name as string for filtering
    pub fn name(&self) -> &'static str {
        match self {
            Milestone::SessionStarted { .. } => "SessionStarted",
            Milestone::ToolConnected => "ToolConnected",
            Milestone::TitleDiscovered { .. } => "TitleDiscovered",
            Milestone::StreamDiscovered { .. } => "StreamDiscovered",
            Milestone::Progress { .. } => "Progress",
            Milestone::ParseComplete { .. } => "ParseComplete",
            Milestone::CommitComplete { .. } => "CommitComplete",
            Milestone::SessionFailed { .. } => "SessionFailed",
        }
    }
}

/// Broadcast bus carrying `StatusEvent`s to all subscribers
#[derive(Debug)]
pub struct EventBus {
    tx: broadcast::Sender<StatusEvent>,
}

impl EventBus {
    /// Creates a new EventBus with the given channel capacity.
    ///
    /// Old events are dropped once the channel is full; slow subscribers see
    /// a lag error rather than stalling publishers.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events.
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers.
    ///
    /// Returns the subscriber count, or an error if no subscriber is
    /// listening. Callers on the pipeline path must treat that error as
    /// non-fatal.
    pub fn emit(
        &self,
        event: StatusEvent,
    ) -> std::result::Result<usize, broadcast::error::SendError<StatusEvent>> {
        self.tx.send(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event(sequence: u64, milestone: Milestone) -> StatusEvent {
        StatusEvent {
            session_id: Uuid::new_v4(),
            sequence,
            timestamp: Utc::now(),
            milestone,
        }
    }

    #[tokio::test]
    async fn test_emit_and_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit(sample_event(0, Milestone::ToolConnected)).unwrap();
        let received = rx.recv().await.unwrap();
        assert_eq!(received.sequence, 0);
        assert_eq!(received.milestone, Milestone::ToolConnected);
    }

    #[test]
    fn test_emit_without_subscribers_is_error() {
        let bus = EventBus::new(16);
        assert!(bus.emit(sample_event(0, Milestone::ToolConnected)).is_err());
    }

    #[test]
    fn test_milestone_serialization_is_tagged() {
        let event = sample_event(
            3,
            Milestone::TitleDiscovered { title_index: 2 },
        );
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"TitleDiscovered\""));
        assert!(json.contains("\"title_index\":2"));
        assert!(json.contains("\"sequence\":3"));

        let back: StatusEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.milestone, Milestone::TitleDiscovered { title_index: 2 });
    }

    #[test]
    fn test_milestone_names() {
        assert_eq!(Milestone::ToolConnected.name(), "ToolConnected");
        assert_eq!(
            Milestone::SessionFailed { reason: "x".into() }.name(),
            "SessionFailed"
        );
    }
}
