//! Cross-context session-change notification primitive.
//!
//! Sibling execution contexts of the same client (tabs, windows, worker
//! processes) keep their in-memory session observers consistent by relaying
//! auth-state changes over a shared channel. This is best-effort
//! notification, not a distributed lock: contexts still re-derive session
//! state from storage on wake.
//!
//! Messages carry a `broadcasted` flag. A message received from the channel
//! is re-emitted locally with the flag set and must never be published
//! again; that is what prevents an infinite relay loop between contexts.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// One relayed auth-state change.
///
/// `event` is the engine's event name in wire form; `session` is an opaque
/// read-only snapshot for subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncMessage {
    /// Event name (snake_case wire form).
    pub event: String,
    /// Read-only session snapshot, if one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<serde_json::Value>,
    /// Set on messages that already crossed the channel once.
    #[serde(default)]
    pub broadcasted: bool,
}

/// Shared channel between sibling contexts.
///
/// Hosts with a real broadcast medium bridge it behind this trait; hosts
/// without one plug in [`NoopChannel`].
pub trait SessionChannel: Send + Sync {
    /// Publish a locally-originated message to sibling contexts.
    fn publish(&self, message: SyncMessage);

    /// Subscribe to messages from sibling contexts.
    fn subscribe(&self) -> broadcast::Receiver<SyncMessage>;
}

/// In-process channel over `tokio::sync::broadcast`.
///
/// Serves same-process sibling contexts directly and doubles as the buffer
/// a host bridge drains when relaying to a real external medium.
pub struct LocalChannel {
    sender: broadcast::Sender<SyncMessage>,
}

impl LocalChannel {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(64);
        Self { sender }
    }

    /// Inject a message as if it arrived from a sibling context. The
    /// `broadcasted` flag is forced on so receivers never relay it again.
    pub fn receive_external(&self, mut message: SyncMessage) {
        message.broadcasted = true;
        // Send fails only when no receiver is subscribed; that is fine.
        let _ = self.sender.send(message);
    }
}

impl Default for LocalChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionChannel for LocalChannel {
    fn publish(&self, message: SyncMessage) {
        if message.broadcasted {
            debug!(event = %message.event, "dropping already-broadcast message");
            return;
        }
        let _ = self.sender.send(message);
    }

    fn subscribe(&self) -> broadcast::Receiver<SyncMessage> {
        self.sender.subscribe()
    }
}

/// Channel for hosts with no shared medium; publishes vanish and
/// subscriptions never yield.
pub struct NoopChannel {
    sender: broadcast::Sender<SyncMessage>,
}

impl NoopChannel {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self { sender }
    }
}

impl Default for NoopChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionChannel for NoopChannel {
    fn publish(&self, _message: SyncMessage) {}

    fn subscribe(&self) -> broadcast::Receiver<SyncMessage> {
        self.sender.subscribe()
    }
}
