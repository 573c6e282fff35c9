//! Cross-context session synchronization.
//!
//! Bridges the event emitter and the broadcast channel in both directions:
//! locally-originated events are published to sibling contexts, and
//! messages received from siblings update local session state and are
//! re-emitted to local subscribers without ever being published again.

use crate::events::{AuthEvent, EventEmitter};
use crate::session::{Session, SessionManager};
use latchkey_broadcast::{SessionChannel, SyncMessage};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Events worth relaying to sibling contexts: the ones that change the
/// session itself. Flow-progress events stay local to their context.
fn crosses_contexts(event: AuthEvent) -> bool {
    matches!(
        event,
        AuthEvent::SignIn
            | AuthEvent::SignOut
            | AuthEvent::TokenRefreshed
            | AuthEvent::SessionExpired
    )
}

/// The running synchronizer. Stops relaying when dropped.
pub struct BroadcastSync {
    task: Mutex<Option<JoinHandle<()>>>,
}

impl BroadcastSync {
    /// Wire the emitter and channel together and start the inbound relay.
    pub fn start(
        emitter: &Arc<EventEmitter>,
        channel: Arc<dyn SessionChannel>,
        manager: Arc<SessionManager>,
    ) -> Self {
        let outbound = channel.clone();
        emitter.set_broadcast_hook(Box::new(move |event, session, _user| {
            if !crosses_contexts(event) {
                return;
            }
            let snapshot = match session {
                Session::Unauthenticated => None,
                other => serde_json::to_value(other).ok(),
            };
            outbound.publish(SyncMessage {
                event: event.as_str().to_string(),
                session: snapshot,
                broadcasted: false,
            });
        }));

        let emitter = emitter.clone();
        let mut receiver = channel.subscribe();
        let task = tokio::spawn(async move {
            loop {
                let message = match receiver.recv().await {
                    Ok(message) => message,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        // Dropped notifications are recoverable: the next
                        // hydrate rebuilds state from storage.
                        warn!(skipped, "sync receiver lagged");
                        continue;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                };
                if !message.broadcasted {
                    // Own publish echoed back by an in-process channel.
                    continue;
                }
                Self::apply(&emitter, &manager, message).await;
            }
        });

        Self {
            task: Mutex::new(Some(task)),
        }
    }

    /// Apply one received message: reconcile local state with storage,
    /// then re-emit to local subscribers only.
    async fn apply(emitter: &Arc<EventEmitter>, manager: &Arc<SessionManager>, message: SyncMessage) {
        let Some(event) = AuthEvent::from_wire(&message.event) else {
            debug!(event = %message.event, "ignoring unknown sync event");
            return;
        };
        debug!(event = %message.event, "applying sync message");

        match event {
            AuthEvent::SignOut | AuthEvent::SessionExpired => {
                if let Err(e) = manager.clear().await {
                    warn!(error = %e, "failed to clear session after sync message");
                }
            }
            _ => {
                // A sibling signed in or refreshed; storage already holds
                // the new tokens. Rehydrate rather than hydrate: the local
                // session may still be authenticated around tokens the
                // sibling just rotated out.
                if let Err(e) = manager.rehydrate().await {
                    warn!(error = %e, "failed to rehydrate session after sync message");
                }
            }
        }

        let session = manager.current();
        emitter.emit(event, &session, manager.current_user().as_ref());
    }

    pub fn stop(&self) {
        if let Some(task) = self.task.lock().unwrap().take() {
            task.abort();
        }
    }
}

impl Drop for BroadcastSync {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Endpoints;
    use crate::config::EngineConfig;
    use crate::testutil::FakeApi;
    use crate::token::test_tokens::jwt_with_expiry;
    use chrono::{Duration, Utc};
    use latchkey_broadcast::LocalChannel;
    use latchkey_storage::{MemoryStore, StorageKeys, TokenStore};
    use latchkey_transport::ApiClient;

    fn manager(store: Arc<MemoryStore>, events: Arc<EventEmitter>) -> Arc<SessionManager> {
        let fake = FakeApi::new();
        let api = Arc::new(ApiClient::with_executor(fake, "https://api.test"));
        Arc::new(SessionManager::new(
            EngineConfig::new("https://api.test", "app-1", "pk_test"),
            api,
            Endpoints::new("app-1"),
            store,
            events,
        ))
    }

    async fn drain(receiver: &mut tokio::sync::broadcast::Receiver<SyncMessage>) -> SyncMessage {
        tokio::time::timeout(std::time::Duration::from_secs(1), receiver.recv())
            .await
            .expect("timed out waiting for sync message")
            .expect("channel closed")
    }

    #[tokio::test]
    async fn test_local_sign_in_is_published() {
        let events = Arc::new(EventEmitter::new());
        let channel = Arc::new(LocalChannel::new());
        let store = Arc::new(MemoryStore::new());
        let manager = manager(store, events.clone());
        let _sync = BroadcastSync::start(&events, channel.clone(), manager);

        let mut receiver = channel.subscribe();
        let session = Session::Authenticated {
            access: jwt_with_expiry(Utc::now() + Duration::hours(1)),
            access_expires_at: Utc::now() + Duration::hours(1),
            refresh: None,
            refresh_expires_at: None,
            csrf: None,
        };
        events.notify(AuthEvent::SignIn, &session, None);

        let message = drain(&mut receiver).await;
        assert_eq!(message.event, "sign_in");
        assert!(!message.broadcasted);
        assert!(message.session.is_some());
    }

    #[tokio::test]
    async fn test_flow_progress_events_stay_local() {
        let events = Arc::new(EventEmitter::new());
        let channel = Arc::new(LocalChannel::new());
        let store = Arc::new(MemoryStore::new());
        let manager = manager(store, events.clone());
        let _sync = BroadcastSync::start(&events, channel.clone(), manager);

        let mut receiver = channel.subscribe();
        events.notify(AuthEvent::MagicPending, &Session::Unauthenticated, None);
        events.notify(AuthEvent::SignOut, &Session::Unauthenticated, None);

        // Only the sign-out crossed; the magic-link progress did not.
        let message = drain(&mut receiver).await;
        assert_eq!(message.event, "sign_out");
    }

    #[tokio::test]
    async fn test_received_sign_out_clears_and_reemits_without_republish() {
        let events = Arc::new(EventEmitter::new());
        let channel = Arc::new(LocalChannel::new());
        let store = Arc::new(MemoryStore::new());
        store
            .set(StorageKeys::ACCESS_TOKEN, "token", None)
            .await
            .unwrap();
        let manager = manager(store.clone(), events.clone());

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = events.subscribe(Box::new(move |event, _, _| {
            sink.lock().unwrap().push(event);
        }));

        let _sync = BroadcastSync::start(&events, channel.clone(), manager);
        let mut receiver = channel.subscribe();

        channel.receive_external(SyncMessage {
            event: "sign_out".to_string(),
            session: None,
            broadcasted: false,
        });

        // The relay consumes the injected message first.
        let injected = drain(&mut receiver).await;
        assert!(injected.broadcasted);
        for _ in 0..10 {
            if seen.lock().unwrap().contains(&AuthEvent::SignOut) {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        // Local subscribers saw the event, storage was cleared, and the
        // channel carried no second copy.
        assert!(seen.lock().unwrap().contains(&AuthEvent::SignOut));
        assert!(store.get(StorageKeys::ACCESS_TOKEN).await.unwrap().is_none());
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_received_sign_in_hydrates_from_storage() {
        let events = Arc::new(EventEmitter::new());
        let channel = Arc::new(LocalChannel::new());
        let store = Arc::new(MemoryStore::new());
        // Another context already wrote the new tokens.
        let access = jwt_with_expiry(Utc::now() + Duration::hours(1));
        store
            .set(StorageKeys::ACCESS_TOKEN, &access, None)
            .await
            .unwrap();

        let manager = manager(store, events.clone());
        let _sync = BroadcastSync::start(&events, channel.clone(), manager.clone());

        channel.receive_external(SyncMessage {
            event: "sign_in".to_string(),
            session: None,
            broadcasted: false,
        });

        // Let the relay task run.
        for _ in 0..10 {
            tokio::task::yield_now().await;
            if manager.current().is_authenticated() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(manager.current().is_authenticated());
    }

    #[tokio::test]
    async fn test_received_token_refreshed_replaces_stale_tokens() {
        let events = Arc::new(EventEmitter::new());
        let channel = Arc::new(LocalChannel::new());
        let store = Arc::new(MemoryStore::new());
        let manager = manager(store.clone(), events.clone());

        // This context is authenticated around the pre-rotation tokens.
        manager
            .set_session(&crate::session::TokenPayload {
                access_token: jwt_with_expiry(Utc::now() + Duration::hours(1)),
                refresh_token: Some("refresh-old".to_string()),
                csrf_token: None,
                access_expires_at: None,
                refresh_expires_at: None,
                user: serde_json::Value::Null,
                webauthn_required: false,
            })
            .await
            .unwrap();

        // A sibling refreshed and rotated the stored tokens.
        let rotated_access = jwt_with_expiry(Utc::now() + Duration::hours(2));
        store
            .set(StorageKeys::ACCESS_TOKEN, &rotated_access, None)
            .await
            .unwrap();
        store
            .set(StorageKeys::REFRESH_TOKEN, "refresh-new", None)
            .await
            .unwrap();

        let _sync = BroadcastSync::start(&events, channel.clone(), manager.clone());
        channel.receive_external(SyncMessage {
            event: "token_refreshed".to_string(),
            session: None,
            broadcasted: false,
        });

        // Spending "refresh-old" after this point would kill the session
        // server-side; the in-memory copy must follow storage.
        for _ in 0..10 {
            if manager.current().refresh_token() == Some("refresh-new") {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        let session = manager.current();
        assert_eq!(session.access_token(), Some(rotated_access.as_str()));
        assert_eq!(session.refresh_token(), Some("refresh-new"));
    }
}
