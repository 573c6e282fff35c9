//! Auth-state event stream.
//!
//! The orchestrator publishes every auth-state transition here;
//! presentation layers subscribe and receive read-only snapshots. The
//! registry is explicit publish/subscribe with an unsubscribe handle, no
//! global listener state.

use crate::session::Session;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tracing::debug;

/// Auth-state transition events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthEvent {
    /// First session snapshot delivered to a new subscriber context.
    InitialSession,
    SignIn,
    SignOut,
    TokenRefreshed,
    SessionRefetch,
    SessionExpired,
    /// Magic link issued; poll for consumption.
    MagicPending,
    /// Magic link issued because the device was unknown for the user.
    MagicNewDevicePending,
    /// Magic link token received, exchange in progress.
    MagicLoading,
    /// Device credential registered.
    BioRegister,
    /// Device credential asserted.
    BioVerify,
}

impl AuthEvent {
    /// Wire form (snake_case), also used on the broadcast channel.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthEvent::InitialSession => "initial_session",
            AuthEvent::SignIn => "sign_in",
            AuthEvent::SignOut => "sign_out",
            AuthEvent::TokenRefreshed => "token_refreshed",
            AuthEvent::SessionRefetch => "session_refetch",
            AuthEvent::SessionExpired => "session_expired",
            AuthEvent::MagicPending => "magic_pending",
            AuthEvent::MagicNewDevicePending => "magic_new_device_pending",
            AuthEvent::MagicLoading => "magic_loading",
            AuthEvent::BioRegister => "bio_register",
            AuthEvent::BioVerify => "bio_verify",
        }
    }

    /// Parse the wire form back into an event; unknown names (a newer
    /// sibling context, say) yield `None`.
    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "initial_session" => Some(AuthEvent::InitialSession),
            "sign_in" => Some(AuthEvent::SignIn),
            "sign_out" => Some(AuthEvent::SignOut),
            "token_refreshed" => Some(AuthEvent::TokenRefreshed),
            "session_refetch" => Some(AuthEvent::SessionRefetch),
            "session_expired" => Some(AuthEvent::SessionExpired),
            "magic_pending" => Some(AuthEvent::MagicPending),
            "magic_new_device_pending" => Some(AuthEvent::MagicNewDevicePending),
            "magic_loading" => Some(AuthEvent::MagicLoading),
            "bio_register" => Some(AuthEvent::BioRegister),
            "bio_verify" => Some(AuthEvent::BioVerify),
            _ => None,
        }
    }
}

/// Subscriber callback. `session` and `user` are read-only snapshots.
pub type EventCallback = Box<dyn Fn(AuthEvent, &Session, Option<&Value>) + Send + Sync>;

/// Publish/subscribe registry for auth-state changes.
///
/// Locally-originated events go through [`EventEmitter::notify`], which
/// also invokes the broadcast hook (the cross-context synchronizer).
/// Events re-emitted after arriving *from* the broadcast channel go through
/// [`EventEmitter::emit`], which skips the hook — that is what keeps a
/// received event from being relayed back out.
#[derive(Default)]
pub struct EventEmitter {
    subscribers: Mutex<HashMap<u64, Arc<EventCallback>>>,
    broadcast_hook: Mutex<Option<Arc<EventCallback>>>,
    next_id: AtomicU64,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the outbound broadcast hook. At most one is active.
    pub fn set_broadcast_hook(&self, hook: EventCallback) {
        *self.broadcast_hook.lock().unwrap() = Some(Arc::new(hook));
    }

    /// Publish a locally-originated event: subscribers plus the broadcast
    /// hook.
    pub fn notify(&self, event: AuthEvent, session: &Session, user: Option<&Value>) {
        self.emit(event, session, user);
        let hook = self.broadcast_hook.lock().unwrap().clone();
        if let Some(hook) = hook {
            hook(event, session, user);
        }
    }

    /// Register a callback. Dropping the returned handle does not
    /// unsubscribe; call [`Subscription::unsubscribe`].
    pub fn subscribe(self: &Arc<Self>, callback: EventCallback) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.subscribers.lock().unwrap().insert(id, Arc::new(callback));
        Subscription {
            id,
            emitter: Arc::downgrade(self),
        }
    }

    /// Deliver an event to every subscriber.
    ///
    /// Callbacks run with the registry lock released, so a subscriber may
    /// subscribe or unsubscribe from inside its callback.
    pub fn emit(&self, event: AuthEvent, session: &Session, user: Option<&Value>) {
        let callbacks: Vec<Arc<EventCallback>> = {
            let subscribers = self.subscribers.lock().unwrap();
            subscribers.values().cloned().collect()
        };
        debug!(
            event = event.as_str(),
            subscribers = callbacks.len(),
            "emitting auth event"
        );
        for callback in callbacks {
            callback(event, session, user);
        }
    }

    fn remove(&self, id: u64) {
        self.subscribers.lock().unwrap().remove(&id);
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }
}

/// Handle returned by [`EventEmitter::subscribe`].
pub struct Subscription {
    id: u64,
    emitter: Weak<EventEmitter>,
}

impl Subscription {
    /// Remove the callback from the registry.
    pub fn unsubscribe(self) {
        if let Some(emitter) = self.emitter.upgrade() {
            emitter.remove(self.id);
        }
    }
}
