//! Namespace-change fan-out to subscribed sessions.
//!
//! Built on `tokio::sync::broadcast`: publishers never block, each
//! subscriber gets a bounded view of a shared ring buffer, and dropping the
//! receiver unsubscribes. A subscriber that falls more than the channel
//! capacity behind loses the oldest events (`RecvError::Lagged`) and
//! continues from what is still buffered; events that do arrive are always
//! in publish order.

use tokio::sync::broadcast;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateAction {
    Created,
    Deleted,
}

impl UpdateAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateAction::Created => "created",
            UpdateAction::Deleted => "deleted",
        }
    }
}

impl std::fmt::Display for UpdateAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One namespace change, carrying the on-disk base name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateEvent {
    pub filename: String,
    pub action: UpdateAction,
}

impl UpdateEvent {
    pub fn created(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            action: UpdateAction::Created,
        }
    }

    pub fn deleted(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            action: UpdateAction::Deleted,
        }
    }
}

pub struct NotificationBus {
    tx: broadcast::Sender<UpdateEvent>,
}

impl NotificationBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Register a new subscription slot; dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<UpdateEvent> {
        self.tx.subscribe()
    }

    /// Deliver `event` to every live subscriber. Never blocks; with no
    /// subscribers the event is dropped.
    pub fn publish(&self, event: UpdateEvent) {
        trace!(file = %event.filename, action = %event.action, "publish");
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
