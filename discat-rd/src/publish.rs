//! Status event publication
//!
//! Wraps the event bus with per-session sequencing. Events are emitted in
//! pipeline order; delivery is best-effort and never blocks or fails the
//! session that publishes.

use chrono::Utc;
use discat_common::events::{EventBus, Milestone, StatusEvent};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Publishes one session's milestones with monotonic sequence numbers
#[derive(Debug)]
pub struct StatusPublisher {
    bus: Arc<EventBus>,
    session_id: Uuid,
    sequence: AtomicU64,
}

impl StatusPublisher {
    pub fn new(bus: Arc<EventBus>, session_id: Uuid) -> Self {
        Self {
            bus,
            session_id,
            sequence: AtomicU64::new(0),
        }
    }

    /// Emit a milestone. A bus with no subscribers is not an error.
    pub fn publish(&self, milestone: Milestone) {
        let event = StatusEvent {
            session_id: self.session_id,
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst),
            timestamp: Utc::now(),
            milestone,
        };
        let name = event.milestone.name();
        if self.bus.emit(event).is_err() {
            debug!(
                session_id = %self.session_id,
                milestone = name,
                "No status subscribers; event dropped"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sequence_is_monotonic_from_zero() {
        let bus = Arc::new(EventBus::new(16));
        let mut rx = bus.subscribe();
        let publisher = StatusPublisher::new(bus, Uuid::new_v4());

        publisher.publish(Milestone::ToolConnected);
        publisher.publish(Milestone::TitleDiscovered { title_index: 0 });
        publisher.publish(Milestone::ParseComplete { title_count: 1 });

        for expected in 0..3u64 {
            let event = rx.recv().await.unwrap();
            assert_eq!(event.sequence, expected);
        }
    }

    #[test]
    fn test_publish_without_subscribers_does_not_panic() {
        let publisher = StatusPublisher::new(Arc::new(EventBus::new(16)), Uuid::new_v4());
        publisher.publish(Milestone::ToolConnected);
    }

    #[tokio::test]
    async fn test_events_carry_session_id() {
        let bus = Arc::new(EventBus::new(16));
        let mut rx = bus.subscribe();
        let session_id = Uuid::new_v4();
        let publisher = StatusPublisher::new(bus, session_id);

        publisher.publish(Milestone::SessionStarted {
            device_path: "/dev/sr0".to_string(),
        });
        let event = rx.recv().await.unwrap();
        assert_eq!(event.session_id, session_id);
    }
}
