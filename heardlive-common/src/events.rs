//! Session-change events
//!
//! The identity client publishes a [`SessionEvent`] after every call that
//! changes who is signed in. Anything caching per-user state (the auth
//! context, the SSE stream to the browser) subscribes to the bus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::models::AuthUser;

/// Session-change event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SessionEvent {
    /// A session was established (password, federated or sign-up)
    SignedIn {
        user: AuthUser,
        timestamp: DateTime<Utc>,
    },

    /// The access token was replaced by a refresh
    TokenRefreshed {
        user: AuthUser,
        timestamp: DateTime<Utc>,
    },

    /// The session ended
    SignedOut { timestamp: DateTime<Utc> },
}

impl SessionEvent {
    pub fn signed_in(user: AuthUser) -> Self {
        SessionEvent::SignedIn {
            user,
            timestamp: Utc::now(),
        }
    }

    pub fn token_refreshed(user: AuthUser) -> Self {
        SessionEvent::TokenRefreshed {
            user,
            timestamp: Utc::now(),
        }
    }

    pub fn signed_out() -> Self {
        SessionEvent::SignedOut {
            timestamp: Utc::now(),
        }
    }

    /// User carried by the event, `None` once signed out
    pub fn user(&self) -> Option<&AuthUser> {
        match self {
            SessionEvent::SignedIn { user, .. } | SessionEvent::TokenRefreshed { user, .. } => {
                Some(user)
            }
            SessionEvent::SignedOut { .. } => None,
        }
    }

    /// Event name used on the SSE stream
    pub fn event_type(&self) -> &'static str {
        match self {
            SessionEvent::SignedIn { .. } => "SignedIn",
            SessionEvent::TokenRefreshed { .. } => "TokenRefreshed",
            SessionEvent::SignedOut { .. } => "SignedOut",
        }
    }
}

/// Broadcast bus for session events
///
/// Backed by `tokio::sync::broadcast`: publishing never blocks, each
/// subscriber gets every event sent after it subscribed, and receivers
/// clean up when dropped.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn user() -> AuthUser {
        AuthUser {
            id: Uuid::new_v4(),
            email: Some("fan@example.com".to_string()),
            user_metadata: serde_json::Value::Null,
        }
    }

    #[tokio::test]
    async fn test_subscriber_receives_events_in_order() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();
        let u = user();

        bus.emit_lossy(SessionEvent::signed_in(u.clone()));
        bus.emit_lossy(SessionEvent::signed_out());

        let first = rx.recv().await.unwrap();
        assert_eq!(first.user(), Some(&u));
        assert_eq!(first.event_type(), "SignedIn");

        let second = rx.recv().await.unwrap();
        assert!(second.user().is_none());
    }

    #[test]
    fn test_emit_without_subscribers_is_silent() {
        let bus = EventBus::new(4);
        bus.emit_lossy(SessionEvent::signed_out());
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.capacity(), 4);
    }

    #[test]
    fn test_dropped_receiver_unsubscribes() {
        let bus = EventBus::new(4);
        let rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        drop(rx);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let json = serde_json::to_value(SessionEvent::signed_out()).unwrap();
        assert_eq!(json["type"], "SignedOut");
    }
}
