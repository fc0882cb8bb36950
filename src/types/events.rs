//! Typed event bus for call lifecycle notifications.
//!
//! The notification collaborator subscribes to these channels; delivering
//! pushes to devices is its problem, not this crate's. Senders never block
//! and dropped events (no subscriber) are not an error.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use super::call::{CallId, CallType, EndReason, UserId};

// The size of the broadcast channel buffer.
const CHANNEL_CAPACITY: usize = 100;

/// The call entered RINGING and targets should be alerted.
#[derive(Debug, Clone, Serialize)]
pub struct CallRinging {
    pub call_id: CallId,
    pub call_type: CallType,
    pub initiator: UserId,
    pub targets: Vec<UserId>,
}

/// A callee accepted; media negotiation is starting.
#[derive(Debug, Clone, Serialize)]
pub struct CallAccepted {
    pub call_id: CallId,
    pub user_id: UserId,
}

/// Media connected and the call went ACTIVE.
#[derive(Debug, Clone, Serialize)]
pub struct CallConnected {
    pub call_id: CallId,
    pub started_at: DateTime<Utc>,
}

/// The call reached ENDED.
#[derive(Debug, Clone, Serialize)]
pub struct CallEnded {
    pub call_id: CallId,
    pub reason: EndReason,
    pub duration_secs: i64,
}

/// A ringing call expired unanswered.
#[derive(Debug, Clone, Serialize)]
pub struct CallMissed {
    pub call_id: CallId,
    pub initiator: UserId,
    pub targets: Vec<UserId>,
}

/// The call reached FAILED.
#[derive(Debug, Clone, Serialize)]
pub struct CallFailed {
    pub call_id: CallId,
    pub reason: EndReason,
}

// Macro to generate EventBus fields and constructor
macro_rules! define_event_bus {
    ($(($field:ident, $type:ty)),* $(,)?) => {
        /// Typed event bus with a separate broadcast channel per event type.
        #[derive(Debug)]
        pub struct EventBus {
            $(
                pub $field: broadcast::Sender<$type>,
            )*
        }

        impl EventBus {
            pub fn new() -> Self {
                Self {
                    $(
                        $field: broadcast::channel(CHANNEL_CAPACITY).0,
                    )*
                }
            }
        }
    };
}

define_event_bus! {
    (call_ringing, Arc<CallRinging>),
    (call_accepted, Arc<CallAccepted>),
    (call_connected, Arc<CallConnected>),
    (call_ended, Arc<CallEnded>),
    (call_missed, Arc<CallMissed>),
    (call_failed, Arc<CallFailed>),
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_bus_delivers_to_subscriber() {
        let bus = EventBus::new();
        let mut rx = bus.call_ended.subscribe();

        let event = Arc::new(CallEnded {
            call_id: CallId::generate(),
            reason: EndReason::UserEnded,
            duration_secs: 42,
        });
        bus.call_ended.send(event.clone()).unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.duration_secs, 42);
        assert_eq!(received.call_id, event.call_id);
    }

    #[test]
    fn test_send_without_subscribers_is_not_fatal() {
        let bus = EventBus::new();
        let result = bus.call_missed.send(Arc::new(CallMissed {
            call_id: CallId::generate(),
            initiator: UserId::new("alice"),
            targets: vec![UserId::new("bob")],
        }));
        // broadcast reports no receivers; callers ignore this on purpose.
        assert!(result.is_err());
    }
}
