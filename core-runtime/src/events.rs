//! # Event Bus System
//!
//! Provides an event-driven architecture for the offline sync core using
//! `tokio::sync::broadcast`. This module enables decoupled communication
//! between core modules through typed events.
//!
//! ## Overview
//!
//! The event bus system consists of:
//! - **Event Types**: Strongly-typed enum hierarchies for different domains
//! - **EventBus**: Central broadcast channel for publishing events
//! - **EventStream**: Wrapper for consuming events with filtering
//! - **Subscription Management**: Multiple subscribers can listen independently
//!
//! The scheduler relies on two event families: [`OfflineEvent`] carries item
//! set mutations and job lifecycle transitions (the removal signal consumed by
//! in-flight jobs as a cooperative abort request lives here), and
//! [`NetworkEvent`] carries reachability transitions (the unreachable signal
//! consumed as a hard-cancel request, and the reachable signal consumed by the
//! external re-drive mechanism).
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{EventBus, CoreEvent, NetworkEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut subscriber = event_bus.subscribe();
//!
//! event_bus.emit(CoreEvent::Network(NetworkEvent::BecameUnreachable)).ok();
//!
//! let received = subscriber.recv().await.unwrap();
//! assert_eq!(received, CoreEvent::Network(NetworkEvent::BecameUnreachable));
//! # }
//! ```
//!
//! ## Error Handling
//!
//! The event bus uses `tokio::sync::broadcast`, which can produce two types
//! of errors on the receiving side:
//!
//! - **`RecvError::Lagged(n)`**: Subscriber was too slow and missed `n`
//!   events. Non-fatal; the subscriber can continue receiving new events, but
//!   should re-read any state it derives from the event stream.
//! - **`RecvError::Closed`**: All senders have been dropped. This indicates
//!   shutdown.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

// Re-export commonly used types
pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// This value balances memory usage with the ability to handle bursts of
/// events. Subscribers that can't keep up will receive `RecvError::Lagged`.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
///
/// This is the main event type published and received through the event bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Offline item set and job lifecycle events
    Offline(OfflineEvent),
    /// Network reachability events
    Network(NetworkEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Offline(e) => e.description(),
            CoreEvent::Network(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Offline(OfflineEvent::JobErrored { .. }) => EventSeverity::Error,
            CoreEvent::Network(NetworkEvent::BecameUnreachable) => EventSeverity::Warning,
            CoreEvent::Offline(OfflineEvent::JobCompleted { .. }) => EventSeverity::Info,
            CoreEvent::Network(NetworkEvent::BecameReachable) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    /// Debug-level events (verbose)
    Debug,
    /// Informational events
    Info,
    /// Warning events
    Warning,
    /// Error events
    Error,
}

// ============================================================================
// Offline Events
// ============================================================================

/// Events related to the offline item set and the job queue.
///
/// `ItemRemoved` doubles as the cooperative abort signal: it is broadcast for
/// *any* entity, so consumers watching a specific job must re-read the item
/// set before concluding their entity was the target.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum OfflineEvent {
    /// An entity was marked for offline and its job enqueued.
    ItemEnqueued {
        /// The entity id.
        entity_id: String,
        /// "track" or "collection".
        entity_type: String,
    },
    /// An entity was removed from the offline set.
    ItemRemoved {
        /// The entity id.
        entity_id: String,
        /// "track" or "collection".
        entity_type: String,
    },
    /// A job moved to the active slot and its entry to `LOADING`.
    JobStarted {
        /// The job kind, e.g. "download-track".
        kind: String,
        /// The target entity id.
        entity_id: String,
    },
    /// A job finished successfully.
    JobCompleted {
        /// The job kind.
        kind: String,
        /// The target entity id.
        entity_id: String,
        /// Unix timestamp recorded as the entry's verification time.
        verified_at: i64,
    },
    /// A job finished with an error.
    JobErrored {
        /// The job kind.
        kind: String,
        /// The target entity id.
        entity_id: String,
    },
    /// A job was abandoned because its entity left the offline set.
    JobAborted {
        /// The job kind.
        kind: String,
        /// The target entity id.
        entity_id: String,
    },
    /// The queue processor changed aggregate state.
    QueueStatusChanged {
        /// "idle", "paused" or "processing".
        status: String,
    },
}

impl OfflineEvent {
    fn description(&self) -> &str {
        match self {
            OfflineEvent::ItemEnqueued { .. } => "Entity marked for offline",
            OfflineEvent::ItemRemoved { .. } => "Entity removed from offline set",
            OfflineEvent::JobStarted { .. } => "Job started",
            OfflineEvent::JobCompleted { .. } => "Job completed",
            OfflineEvent::JobErrored { .. } => "Job errored",
            OfflineEvent::JobAborted { .. } => "Job aborted",
            OfflineEvent::QueueStatusChanged { .. } => "Queue status changed",
        }
    }
}

// ============================================================================
// Network Events
// ============================================================================

/// Reachability transition events.
///
/// The queue processor consumes only `BecameUnreachable` (as the hard-cancel
/// signal); `BecameReachable` is consumed by the external re-drive mechanism,
/// never by the processor itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum NetworkEvent {
    /// The device regained network access.
    BecameReachable,
    /// The device lost network access.
    BecameUnreachable,
}

impl NetworkEvent {
    fn description(&self) -> &str {
        match self {
            NetworkEvent::BecameReachable => "Network became reachable",
            NetworkEvent::BecameUnreachable => "Network became unreachable",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Uses `tokio::sync::broadcast` internally, which provides:
/// - Multiple producers (clone the `EventBus`)
/// - Multiple consumers (each `subscribe()` creates a new receiver)
/// - Non-blocking sends (events are cloned for each subscriber)
/// - Lagging detection (slow subscribers get `RecvError::Lagged`)
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of events to buffer per subscriber.
    ///   When a subscriber falls behind by more than this amount, it will
    ///   receive a `RecvError::Lagged` error.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Creates a new event bus with the default buffer size.
    #[allow(clippy::should_implement_trait)]
    pub fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event.
    /// Returns an error if there are no active subscribers.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber to receive events.
    ///
    /// Each call creates an independent receiver that will receive all future
    /// events. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

/// Type alias for event filter functions.
type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with additional filtering
/// capabilities.
///
/// This provides a more ergonomic API for consuming events with optional
/// filtering by event type or severity.
///
/// # Example
///
/// ```rust
/// use core_runtime::events::{EventBus, EventStream, CoreEvent};
///
/// let event_bus = EventBus::new(100);
/// let stream = EventStream::new(event_bus.subscribe());
///
/// // Filter for network events only
/// let mut network_stream = stream.filter(|event| {
///     matches!(event, CoreEvent::Network(_))
/// });
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    /// Creates a new event stream from a receiver.
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Adds a filter function to this stream.
    ///
    /// Only events that match the filter will be returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Receives the next event that passes the filter (if any).
    ///
    /// This will skip events that don't match the filter and return the next
    /// matching event.
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n`
    /// events. Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;

            let Some(filter) = &self.filter else {
                return Ok(event);
            };

            if filter(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no events are currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    let Some(filter) = &self.filter else {
                        return Some(Ok(event));
                    };

                    if filter(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_bus_creation() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_event_bus_subscription() {
        let bus = EventBus::new(10);
        let _sub1 = bus.subscribe();
        let _sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        let event = CoreEvent::Network(NetworkEvent::BecameUnreachable);

        // Should error when no subscribers
        assert!(bus.emit(event).is_err());
    }

    #[tokio::test]
    async fn test_event_emission_with_subscribers() {
        let bus = EventBus::new(10);
        let mut sub = bus.subscribe();

        let event = CoreEvent::Offline(OfflineEvent::ItemEnqueued {
            entity_id: "track-1".to_string(),
            entity_type: "track".to_string(),
        });

        let result = bus.emit(event.clone());
        assert!(result.is_ok());
        assert_eq!(result.unwrap(), 1);

        let received = sub.recv().await.unwrap();
        assert_eq!(received, event);
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        let event = CoreEvent::Offline(OfflineEvent::JobStarted {
            kind: "download-track".to_string(),
            entity_id: "track-1".to_string(),
        });

        bus.emit(event.clone()).ok();

        let received1 = sub1.recv().await.unwrap();
        let received2 = sub2.recv().await.unwrap();

        assert_eq!(received1, event);
        assert_eq!(received2, event);
    }

    #[tokio::test]
    async fn test_event_stream_with_filter() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|event| matches!(event, CoreEvent::Network(_)));

        // Emit non-network event (should be filtered out)
        let offline_event = CoreEvent::Offline(OfflineEvent::ItemRemoved {
            entity_id: "track-1".to_string(),
            entity_type: "track".to_string(),
        });
        bus.emit(offline_event).ok();

        // Emit network event (should pass through)
        let network_event = CoreEvent::Network(NetworkEvent::BecameUnreachable);
        bus.emit(network_event.clone()).ok();

        let received = stream.recv().await.unwrap();
        assert_eq!(received, network_event);
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2); // Very small buffer
        let mut sub = bus.subscribe();

        for i in 0..5 {
            let event = CoreEvent::Offline(OfflineEvent::ItemEnqueued {
                entity_id: format!("track-{}", i),
                entity_type: "track".to_string(),
            });
            bus.emit(event).ok();
        }

        // First recv should indicate lagging
        let result = sub.recv().await;
        assert!(matches!(result, Err(RecvError::Lagged(_))));
    }

    #[tokio::test]
    async fn test_event_severity() {
        let error_event = CoreEvent::Offline(OfflineEvent::JobErrored {
            kind: "download-track".to_string(),
            entity_id: "track-1".to_string(),
        });
        assert_eq!(error_event.severity(), EventSeverity::Error);

        let warning_event = CoreEvent::Network(NetworkEvent::BecameUnreachable);
        assert_eq!(warning_event.severity(), EventSeverity::Warning);

        let debug_event = CoreEvent::Offline(OfflineEvent::JobStarted {
            kind: "download-track".to_string(),
            entity_id: "track-1".to_string(),
        });
        assert_eq!(debug_event.severity(), EventSeverity::Debug);
    }

    #[tokio::test]
    async fn test_event_description() {
        let event = CoreEvent::Network(NetworkEvent::BecameReachable);
        assert_eq!(event.description(), "Network became reachable");
    }

    #[tokio::test]
    async fn test_event_serialization() {
        let event = CoreEvent::Offline(OfflineEvent::JobCompleted {
            kind: "verify-stale-track".to_string(),
            entity_id: "track-123".to_string(),
            verified_at: 1700000000,
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("track-123"));

        let deserialized: CoreEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, event);
    }

    #[tokio::test]
    async fn test_try_recv_empty() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe());

        assert!(stream.try_recv().is_none());
    }
}
