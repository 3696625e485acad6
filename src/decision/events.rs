//! Domain events emitted for every decision. Delivery is best-effort; a
//! sink failure is logged and never fails the job.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::info;

/// One decision event, carrying what the admin surface needs to display.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DomainEvent {
    VenueApproved {
        venue_id: i64,
        reason: String,
        final_score: u8,
        flags: Vec<String>,
    },
    VenueRejected {
        venue_id: i64,
        reason: String,
        final_score: u8,
        flags: Vec<String>,
    },
    VenueRequiresManualReview {
        venue_id: i64,
        reason: String,
        final_score: u8,
        flags: Vec<String>,
    },
}

impl DomainEvent {
    pub fn venue_id(&self) -> i64 {
        match self {
            DomainEvent::VenueApproved { venue_id, .. }
            | DomainEvent::VenueRejected { venue_id, .. }
            | DomainEvent::VenueRequiresManualReview { venue_id, .. } => *venue_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::VenueApproved { .. } => "VenueApproved",
            DomainEvent::VenueRejected { .. } => "VenueRejected",
            DomainEvent::VenueRequiresManualReview { .. } => "VenueRequiresManualReview",
        }
    }
}

/// Append-only event sink; implementations must be thread-safe.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: DomainEvent);
}

/// Default sink: structured log lines.
#[derive(Debug, Default)]
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn publish(&self, event: DomainEvent) {
        info!(
            event = event.name(),
            venue_id = event.venue_id(),
            "decision event"
        );
    }
}

/// In-memory sink retaining events in publish order.
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<DomainEvent>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().expect("event sink lock").clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().expect("event sink lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventSink for MemoryEventSink {
    fn publish(&self, event: DomainEvent) {
        self.events.lock().expect("event sink lock").push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_preserves_order() {
        let sink = MemoryEventSink::new();
        sink.publish(DomainEvent::VenueApproved {
            venue_id: 1,
            reason: "r".to_string(),
            final_score: 90,
            flags: vec![],
        });
        sink.publish(DomainEvent::VenueRejected {
            venue_id: 2,
            reason: "r".to_string(),
            final_score: 30,
            flags: vec![],
        });
        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].venue_id(), 1);
        assert_eq!(events[1].name(), "VenueRejected");
    }
}
