//! In-process notification hub.
//!
//! One broadcast channel per recipient. Publishing never blocks and never
//! fails the caller; a message for a recipient with no live subscriber is
//! dropped.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Per-recipient buffer before slow subscribers start lagging.
const CHANNEL_CAPACITY: usize = 64;

/// A message addressed to one user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub recipient_id: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Fan-out of notifications to live subscribers.
#[derive(Default)]
pub struct NotificationHub {
    channels: RwLock<HashMap<String, broadcast::Sender<Notification>>>,
}

impl NotificationHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to the notifications addressed to `recipient_id`.
    pub fn subscribe(&self, recipient_id: &str) -> broadcast::Receiver<Notification> {
        if let Some(sender) = self.read().get(recipient_id) {
            return sender.subscribe();
        }
        self.write()
            .entry(recipient_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Deliver `message` to `recipient_id` if anyone is listening.
    pub fn publish(&self, recipient_id: &str, message: impl Into<String>) {
        let notification = Notification {
            recipient_id: recipient_id.to_string(),
            message: message.into(),
            created_at: Utc::now(),
        };

        let delivered = match self.read().get(recipient_id) {
            Some(sender) => sender.send(notification).is_ok(),
            None => false,
        };

        if delivered {
            tracing::debug!(recipient = recipient_id, "notification delivered");
        } else {
            tracing::debug!(recipient = recipient_id, "no subscriber, notification dropped");
            self.prune(recipient_id);
        }
    }

    /// Forget a channel whose subscribers have all gone away.
    fn prune(&self, recipient_id: &str) {
        let mut channels = self.write();
        if channels
            .get(recipient_id)
            .is_some_and(|sender| sender.receiver_count() == 0)
        {
            channels.remove(recipient_id);
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, broadcast::Sender<Notification>>> {
        self.channels.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, broadcast::Sender<Notification>>> {
        self.channels.write().unwrap_or_else(|e| e.into_inner())
    }
}
