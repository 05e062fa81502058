//! EventBus service for typed engine notifications.
//!
//! Provides a broadcast-based event stream with sequence numbering that
//! external collectors subscribe to. Publishing never blocks and never
//! fails: with no subscribers the event is simply dropped. Subscribers
//! receive events in sequence order.

use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;

use crate::domain::models::{EngineEvent, EventPayload, SequenceNumber};

/// Configuration for the EventBus.
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// Channel capacity for the broadcast channel. Slow subscribers that
    /// fall further behind than this observe `RecvError::Lagged`.
    pub channel_capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
        }
    }
}

/// Central event bus for broadcasting engine events to multiple consumers.
#[derive(Debug)]
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
    /// Next sequence number; held across `send` so numbering matches
    /// delivery order.
    sequence: Mutex<u64>,
}

impl EventBus {
    /// Create a new EventBus with the given configuration.
    pub fn new(config: EventBusConfig) -> Self {
        let (sender, _) = broadcast::channel(config.channel_capacity.max(1));
        Self {
            sender,
            sequence: Mutex::new(0),
        }
    }

    /// Publish a payload, assigning it an envelope and the next sequence
    /// number. Returns the envelope that was broadcast.
    pub fn publish(&self, payload: EventPayload) -> EngineEvent {
        let mut event = EngineEvent::from(payload);
        {
            let mut next = self.lock_sequence();
            event.sequence = SequenceNumber(*next);
            *next += 1;
            // No subscribers is fine
            let _ = self.sender.send(event.clone());
        }

        tracing::debug!(
            event = event.payload.name(),
            sequence = event.sequence.0,
            severity = %event.severity,
            "Published engine event"
        );
        event
    }

    /// Subscribe to the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    /// Get the next sequence number to be assigned.
    pub fn current_sequence(&self) -> SequenceNumber {
        SequenceNumber(*self.lock_sequence())
    }

    fn lock_sequence(&self) -> MutexGuard<'_, u64> {
        self.sequence.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EventBusConfig::default())
    }
}
