//! Event types and distribution for mezzo services
//!
//! Provides the shared event definitions and the `EventBus` all services
//! publish through. Delivery is best-effort: slow or absent subscribers never
//! block a producer.

mod scan_types;

pub use scan_types::{
    DuplicateReason, ScanDuplicate, ScanError, ScanStats, ScanStepKind, ScanStepStats,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Application events
///
/// Events are broadcast via [`EventBus`] and can be serialized for external
/// consumers. Listeners must not block; dispatch happens on the emitter's
/// task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MezzoEvent {
    /// A scan run has started
    ScanStarted {
        /// When the scan started
        timestamp: DateTime<Utc>,
    },

    /// Progress within a running scan. `step` values are monotonic in
    /// `processed_elems` within one step and in `step_index` across steps.
    ScanProgress {
        /// Snapshot of the current step
        step: ScanStepStats,
    },

    /// A scan run has completed. Emitted exactly once per run, after the
    /// final transaction has committed.
    ScanComplete {
        /// Final counters, errors and duplicates
        stats: ScanStats,
        /// Whether the catalog was modified
        changed: bool,
    },

    /// The next automatic scan has been scheduled
    ScanScheduled {
        /// When the next scan will start
        at: DateTime<Utc>,
    },
}

impl MezzoEvent {
    /// Get event type as string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            MezzoEvent::ScanStarted { .. } => "ScanStarted",
            MezzoEvent::ScanProgress { .. } => "ScanProgress",
            MezzoEvent::ScanComplete { .. } => "ScanComplete",
            MezzoEvent::ScanScheduled { .. } => "ScanScheduled",
        }
    }
}

/// Central event distribution bus
///
/// Backed by `tokio::sync::broadcast`, so publishing never blocks and
/// subscribers that lag simply miss events.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<MezzoEvent>,
    capacity: usize,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<MezzoEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring whether anyone is listening
    pub fn emit_lossy(&self, event: MezzoEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eventbus_delivers_to_all_subscribers() {
        let bus = EventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.emit_lossy(MezzoEvent::ScanStarted {
            timestamp: Utc::now(),
        });

        assert_eq!(rx1.try_recv().unwrap().event_type(), "ScanStarted");
        assert_eq!(rx2.try_recv().unwrap().event_type(), "ScanStarted");
    }

    #[test]
    fn test_emit_without_subscribers_does_not_panic() {
        let bus = EventBus::new(4);
        bus.emit_lossy(MezzoEvent::ScanScheduled { at: Utc::now() });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_event_serialization_round_trip() {
        let event = MezzoEvent::ScanComplete {
            stats: ScanStats::default(),
            changed: true,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"ScanComplete\""));
        assert!(json.contains("\"changed\":true"));

        let back: MezzoEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.event_type(), "ScanComplete");
    }
}
