//! Event types for the ABR event system
//!
//! Provides the shared event definitions and the EventBus used to hand
//! resolved requests to notification dispatch and SSE clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Channel-neutral notification content for a resolved request.
///
/// Notification channels (Discord, Pushover, Gotify, ntfy) format this
/// themselves; nothing here is channel specific.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub request_id: Uuid,
    /// "Title by Author"
    pub headline: String,
    pub title: String,
    pub author: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub narrators: Option<String>,
    /// "Series Name #N"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series: Option<String>,
    /// "12h 5m"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    /// "high", "medium" or "low"
    pub confidence: String,
}

/// ABR event types
///
/// Broadcast via EventBus and serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ResolverEvent {
    /// Webhook accepted and waiting in the resolution queue
    RequestQueued {
        request_id: Uuid,
        name: Option<String>,
        queue_depth: usize,
        timestamp: DateTime<Utc>,
    },

    /// Metadata resolution finished (possibly degraded to payload-only data)
    RequestResolved {
        request_id: Uuid,
        /// Fallback path taken ("primary", "payload_only", ...)
        path: String,
        notification: NotificationPayload,
        timestamp: DateTime<Utc>,
    },

    /// Resolution aborted by a configuration or programming error
    RequestFailed {
        request_id: Uuid,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl ResolverEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            ResolverEvent::RequestQueued { .. } => "RequestQueued",
            ResolverEvent::RequestResolved { .. } => "RequestResolved",
            ResolverEvent::RequestFailed { .. } => "RequestFailed",
        }
    }

    pub fn request_id(&self) -> Uuid {
        match self {
            ResolverEvent::RequestQueued { request_id, .. }
            | ResolverEvent::RequestResolved { request_id, .. }
            | ResolverEvent::RequestFailed { request_id, .. } => *request_id,
        }
    }
}

/// Broadcast bus for resolver events
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ResolverEvent>,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// Slow subscribers lose the oldest events once `capacity` is exceeded.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<ResolverEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    pub fn emit(
        &self,
        event: ResolverEvent,
    ) -> Result<usize, broadcast::error::SendError<ResolverEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: ResolverEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_emitted_event() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let id = Uuid::new_v4();

        bus.emit(ResolverEvent::RequestFailed {
            request_id: id,
            message: "boom".to_string(),
            timestamp: Utc::now(),
        })
        .unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.request_id(), id);
        assert_eq!(event.event_type(), "RequestFailed");
    }

    #[test]
    fn emit_without_subscribers_errors_but_lossy_does_not() {
        let bus = EventBus::new(4);
        let event = ResolverEvent::RequestQueued {
            request_id: Uuid::new_v4(),
            name: None,
            queue_depth: 0,
            timestamp: Utc::now(),
        };
        assert!(bus.emit(event.clone()).is_err());
        bus.emit_lossy(event);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = ResolverEvent::RequestFailed {
            request_id: Uuid::nil(),
            message: "x".to_string(),
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "RequestFailed");
    }
}
