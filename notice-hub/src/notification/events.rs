//! Delivery events.
//!
//! Published after a channel accepted a message so other parts of the host
//! application can react without being called by the dispatcher.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::permissions::ObjectRef;

/// Capacity of the event broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationEvent {
    EmailSent {
        user_id: String,
        notice_type: String,
        object: Option<ObjectRef>,
    },
    SmsSent {
        user_id: String,
        notice_type: String,
        object: Option<ObjectRef>,
    },
}

impl NotificationEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::EmailSent { .. } => "email_sent",
            Self::SmsSent { .. } => "sms_sent",
        }
    }

    pub fn user_id(&self) -> &str {
        match self {
            Self::EmailSent { user_id, .. } | Self::SmsSent { user_id, .. } => user_id,
        }
    }

    pub fn notice_type(&self) -> &str {
        match self {
            Self::EmailSent { notice_type, .. } | Self::SmsSent { notice_type, .. } => notice_type,
        }
    }
}

/// Fan-out of delivery events to any number of subscribers.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<NotificationEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EVENT_CHANNEL_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: NotificationEvent) {
        // No subscribers is fine.
        let _ = self.tx.send(event);
    }
}
