//! Sync event types, envelope, and event bus for side effects.
//!
//! The store is what the rendering layer reads; the event bus is how it learns
//! about things that are not state: a new notification worth a sound or visual
//! cue, a failed mutation worth a toast, a change in signal connectivity.
//! Consumers subscribe independently.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::NotificationRecord;

// ============================================================================
// Connectivity
// ============================================================================

/// State of the push signal channel as seen by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    /// Subscription in progress, no signals yet.
    Connecting,
    /// Signals are flowing.
    Live,
    /// Channel unavailable; polling fallback carries consistency.
    Degraded,
    /// Session torn down.
    Closed,
}

impl Connectivity {
    pub fn as_str(self) -> &'static str {
        match self {
            Connectivity::Connecting => "connecting",
            Connectivity::Live => "live",
            Connectivity::Degraded => "degraded",
            Connectivity::Closed => "closed",
        }
    }
}

/// How a failed optimistic mutation was brought back in line with the remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Recovery {
    /// Prior per-record state restored from a snapshot.
    Rollback,
    /// List and count re-fetched from the remote source.
    Refresh,
    /// Recovery itself failed; the next poll or refresh closes the gap.
    Pending,
}

// ============================================================================
// Sync Event (payloads)
// ============================================================================

/// Side-effect events emitted by the sync engine.
///
/// Serialized as JSON with a `type` tag field, e.g.:
/// `{"type":"ConnectivityChanged","state":"degraded"}`
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum SyncEvent {
    /// A signal or poll delivered a notification the user has not seen.
    NewNotification { record: NotificationRecord },
    /// The signal channel changed state.
    ConnectivityChanged { state: Connectivity },
    /// An optimistic mutation was rejected by the remote source.
    MutationFailed {
        operation: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        notification_id: Option<String>,
        error: String,
        recovery: Recovery,
    },
    /// The store was replaced from an authoritative list fetch.
    Resynced { record_count: usize, unread_count: u64 },
}

impl SyncEvent {
    /// Returns the namespaced event type (e.g., `"notification.new"`).
    pub fn event_type(&self) -> &'static str {
        match self {
            SyncEvent::NewNotification { .. } => "notification.new",
            SyncEvent::ConnectivityChanged { .. } => "connectivity.changed",
            SyncEvent::MutationFailed { .. } => "mutation.failed",
            SyncEvent::Resynced { .. } => "store.resynced",
        }
    }

    /// Returns the notification id this event relates to, if any.
    pub fn notification_id(&self) -> Option<&str> {
        match self {
            SyncEvent::NewNotification { record } => Some(record.id.as_str()),
            SyncEvent::MutationFailed {
                notification_id, ..
            } => notification_id.as_deref(),
            SyncEvent::ConnectivityChanged { .. } | SyncEvent::Resynced { .. } => None,
        }
    }
}

// ============================================================================
// Envelope
// ============================================================================

/// Event wrapper carrying identity and timing metadata.
#[derive(Debug, Clone, Serialize)]
pub struct SyncEnvelope {
    /// Unique event identifier (UUIDv7 for temporal ordering).
    pub event_id: Uuid,
    /// Namespaced event type.
    pub event_type: String,
    /// When the event occurred (UTC).
    pub occurred_at: DateTime<Utc>,
    /// Domain-specific event data.
    pub payload: SyncEvent,
}

impl SyncEnvelope {
    pub fn new(event: SyncEvent) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            event_type: event.event_type().to_string(),
            occurred_at: Utc::now(),
            payload: event,
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Broadcast-based event bus for distributing sync events to multiple consumers.
///
/// Uses `tokio::sync::broadcast`. Slow receivers that fall behind receive a
/// `Lagged` error and miss events; cues and toasts are only useful when fresh.
pub struct EventBus {
    tx: broadcast::Sender<SyncEnvelope>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Emit an event to all subscribers. Dropped silently without subscribers.
    pub fn emit(&self, event: SyncEvent) {
        let envelope = SyncEnvelope::new(event);
        tracing::debug!(
            event_type = %envelope.event_type,
            event_id = %envelope.event_id,
            subscriber_count = self.tx.receiver_count(),
            "EventBus emit"
        );
        let _ = self.tx.send(envelope);
    }

    /// Subscribe to receive events. Each subscriber gets its own stream.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEnvelope> {
        self.tx.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(crate::defaults::EVENT_BUS_CAPACITY)
    }
}
