//! Session and token lifecycle management.
//!
//! `SessionManager` owns the session exclusively: it is the only writer of
//! token keys in storage, and every other component reads session state
//! through its accessor. It decodes tokens, tracks expiry, performs
//! single-flight refresh, and runs the background proactive-refresh ticker
//! gated by host visibility.

use crate::api::Endpoints;
use crate::config::EngineConfig;
use crate::error::{AuthError, AuthResult, DomainCode};
use crate::events::{AuthEvent, EventEmitter};
use crate::token;
use chrono::{DateTime, Duration, Utc};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use latchkey_storage::{StorageKeys, TokenStore};
use latchkey_transport::{ApiClient, Verb};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// The client-side session.
///
/// Invariant: `Authenticated` only ever holds a decodable access token with
/// a known expiry. A live refresh token alone is `Unauthenticated` until a
/// refresh succeeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Session {
    Unauthenticated,
    Loading,
    Authenticated {
        access: String,
        access_expires_at: DateTime<Utc>,
        #[serde(skip_serializing_if = "Option::is_none")]
        refresh: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        refresh_expires_at: Option<DateTime<Utc>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        csrf: Option<String>,
    },
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Session::Authenticated { .. })
    }

    /// The bearer token, when authenticated.
    pub fn access_token(&self) -> Option<&str> {
        match self {
            Session::Authenticated { access, .. } => Some(access),
            _ => None,
        }
    }

    pub fn access_expires_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Session::Authenticated {
                access_expires_at, ..
            } => Some(*access_expires_at),
            _ => None,
        }
    }

    pub fn refresh_token(&self) -> Option<&str> {
        match self {
            Session::Authenticated {
                refresh: Some(refresh),
                ..
            } => Some(refresh),
            _ => None,
        }
    }
}

/// Wire shape returned by the server on any successful auth operation.
///
/// Applying the same payload twice yields the same session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenPayload {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub csrf_token: Option<String>,
    #[serde(default)]
    pub access_expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub refresh_expires_at: Option<DateTime<Utc>>,
    /// Opaque user blob, passed through to subscribers.
    #[serde(default)]
    pub user: Value,
    /// Server expects a device-credential registration before the session
    /// is considered complete.
    #[serde(default)]
    pub webauthn_required: bool,
}

type RefreshFuture = Shared<BoxFuture<'static, AuthResult<Session>>>;

/// Ticks remaining until `expires_at`, at the given ticker interval.
pub(crate) fn ticks_remaining(
    expires_at: DateTime<Utc>,
    now: DateTime<Utc>,
    interval: std::time::Duration,
) -> i64 {
    let interval_secs = interval.as_secs().max(1) as i64;
    (expires_at - now).num_seconds() / interval_secs
}

/// Token lifecycle manager. Used behind `Arc`; refresh futures capture a
/// clone of the handle.
pub struct SessionManager {
    config: EngineConfig,
    api: Arc<ApiClient>,
    endpoints: Endpoints,
    store: Arc<dyn TokenStore>,
    events: Arc<EventEmitter>,
    session: Mutex<Session>,
    user: Mutex<Option<Value>>,
    /// Shared handle for the in-flight refresh; cleared on completion.
    inflight: Mutex<Option<RefreshFuture>>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    pub fn new(
        config: EngineConfig,
        api: Arc<ApiClient>,
        endpoints: Endpoints,
        store: Arc<dyn TokenStore>,
        events: Arc<EventEmitter>,
    ) -> Self {
        Self {
            config,
            api,
            endpoints,
            store,
            events,
            session: Mutex::new(Session::Unauthenticated),
            user: Mutex::new(None),
            inflight: Mutex::new(None),
            ticker: Mutex::new(None),
        }
    }

    /// In-memory session snapshot. This is the accessor every other
    /// component reads through; nothing else touches the raw storage keys.
    pub fn current(&self) -> Session {
        self.session.lock().unwrap().clone()
    }

    /// Last known user blob.
    pub fn current_user(&self) -> Option<Value> {
        self.user.lock().unwrap().clone()
    }

    pub(crate) fn set_user(&self, user: Value) {
        if !user.is_null() {
            *self.user.lock().unwrap() = Some(user);
        }
    }

    /// Rebuild the in-memory session from storage, if storage holds a
    /// still-decodable access token. Called on engine start and when a
    /// context wakes after another context updated storage.
    pub async fn hydrate(&self) -> AuthResult<Session> {
        if self.current().is_authenticated() {
            return Ok(self.current());
        }

        let Some(access) = self.store.get(StorageKeys::ACCESS_TOKEN).await? else {
            return Ok(self.current());
        };
        let Some(access_expires_at) = token::decode_expiry(&access) else {
            debug!("stored access token is not decodable, ignoring");
            return Ok(self.current());
        };
        if access_expires_at <= Utc::now() {
            // Expired access token; a live refresh token may still revive
            // the session via refresh().
            return Ok(self.current());
        }

        let refresh = self.store.get(StorageKeys::REFRESH_TOKEN).await?;
        let csrf = self.store.get(StorageKeys::CSRF_TOKEN).await?;
        let session = Session::Authenticated {
            access,
            access_expires_at,
            refresh,
            refresh_expires_at: None,
            csrf,
        };
        *self.session.lock().unwrap() = session.clone();
        debug!("session hydrated from storage");
        Ok(session)
    }

    /// Re-derive the session from storage unconditionally, discarding the
    /// in-memory copy first. Used when a sibling context rotated the tokens
    /// in storage: holding on to the old in-memory refresh token would spend
    /// an already-rotated token on the next refresh.
    pub async fn rehydrate(&self) -> AuthResult<Session> {
        *self.session.lock().unwrap() = Session::Unauthenticated;
        self.hydrate().await
    }

    /// Read the current session, refreshing first when the access token is
    /// at or inside the expiry margin, or when storage holds only a live
    /// refresh token. With `server_check`, additionally validates the
    /// session against the server and force-expires it on rejection.
    pub async fn get_session(self: &Arc<Self>, server_check: bool) -> AuthResult<Session> {
        self.hydrate().await?;

        let margin = Duration::from_std(self.config.expiry_margin)
            .unwrap_or_else(|_| Duration::seconds(10));

        let needs_refresh = match self.current() {
            Session::Authenticated {
                access_expires_at, ..
            } => access_expires_at - margin <= Utc::now(),
            _ => self.store.get(StorageKeys::REFRESH_TOKEN).await?.is_some(),
        };

        if needs_refresh {
            if let Err(e) = self.refresh().await {
                // refresh() already force-expired and signalled; the caller
                // gets the resulting unauthenticated session, not an error.
                debug!(error = %e, "refresh during get_session failed");
            }
        }

        if server_check && self.current().is_authenticated() {
            self.validate_with_server().await?;
        }

        Ok(self.current())
    }

    /// Re-fetch the current user to confirm the server still accepts the
    /// session; rejection force-expires it.
    async fn validate_with_server(self: &Arc<Self>) -> AuthResult<()> {
        let Some(bearer) = self.current().access_token().map(String::from) else {
            return Ok(());
        };

        match self
            .api
            .request_raw(Verb::Get, &self.endpoints.me(), None, Some(&bearer))
            .await
        {
            Ok(user) => {
                self.set_user(user);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "server rejected session during check");
                self.force_expire().await?;
                Ok(())
            }
        }
    }

    /// Apply a token payload as the new session.
    ///
    /// Atomic from the caller's perspective: the refresh/csrf keys are
    /// written before the access token, so a failure part-way never leaves
    /// a decodable access token paired with a stale refresh token from a
    /// different payload. An undecodable access token clears the session.
    pub async fn set_session(&self, payload: &TokenPayload) -> AuthResult<Session> {
        // The access token itself must decode, even when the payload carries
        // a server-supplied expiry; a session is never Authenticated around
        // an opaque token.
        let access_expires_at = token::decode_expiry(&payload.access_token)
            .map(|decoded| payload.access_expires_at.unwrap_or(decoded));

        let Some(access_expires_at) = access_expires_at else {
            warn!("token payload carried an undecodable access token, clearing session");
            self.clear().await?;
            return Err(AuthError::domain_with_message(
                DomainCode::InvalidAuthToken,
                "invalid auth token",
            ));
        };

        match &payload.refresh_token {
            Some(refresh) => {
                self.store
                    .set(StorageKeys::REFRESH_TOKEN, refresh, None)
                    .await?;
            }
            None => {
                self.store.remove(StorageKeys::REFRESH_TOKEN, None).await?;
            }
        }
        match &payload.csrf_token {
            Some(csrf) => {
                self.store.set(StorageKeys::CSRF_TOKEN, csrf, None).await?;
            }
            None => {
                self.store.remove(StorageKeys::CSRF_TOKEN, None).await?;
            }
        }
        self.store
            .set(StorageKeys::ACCESS_TOKEN, &payload.access_token, None)
            .await?;

        let session = Session::Authenticated {
            access: payload.access_token.clone(),
            access_expires_at,
            refresh: payload.refresh_token.clone(),
            refresh_expires_at: payload.refresh_expires_at,
            csrf: payload.csrf_token.clone(),
        };
        *self.session.lock().unwrap() = session.clone();
        self.set_user(payload.user.clone());

        Ok(session)
    }

    /// Clear the session and its storage keys. Does not emit; callers own
    /// the event semantics (sign-out vs. expiry).
    pub async fn clear(&self) -> AuthResult<()> {
        self.store.remove(StorageKeys::ACCESS_TOKEN, None).await?;
        self.store.remove(StorageKeys::REFRESH_TOKEN, None).await?;
        self.store.remove(StorageKeys::CSRF_TOKEN, None).await?;
        *self.session.lock().unwrap() = Session::Unauthenticated;
        *self.user.lock().unwrap() = None;
        Ok(())
    }

    /// Clear the session and signal `session_expired`.
    pub async fn force_expire(&self) -> AuthResult<()> {
        self.clear().await?;
        info!("session force-expired");
        self.events
            .notify(AuthEvent::SessionExpired, &Session::Unauthenticated, None);
        Ok(())
    }

    /// Exchange the refresh token for a new token payload.
    ///
    /// Single-flight: concurrent callers share one in-flight result, so a
    /// rotating refresh token is only ever spent once per context. Any
    /// failure force-expires the session; transient-network retry is the
    /// transport's job, not repeated here.
    pub async fn refresh(self: &Arc<Self>) -> AuthResult<Session> {
        let (future, is_owner) = {
            let mut inflight = self.inflight.lock().unwrap();
            match inflight.as_ref() {
                Some(existing) => (existing.clone(), false),
                None => {
                    let manager = self.clone();
                    let future: RefreshFuture =
                        async move { manager.refresh_inner().await }.boxed().shared();
                    *inflight = Some(future.clone());
                    (future, true)
                }
            }
        };

        let result = future.await;
        if is_owner {
            *self.inflight.lock().unwrap() = None;
        }
        result
    }

    async fn refresh_inner(self: Arc<Self>) -> AuthResult<Session> {
        let refresh_token = match self.current() {
            Session::Authenticated {
                refresh: Some(refresh),
                ..
            } => Some(refresh),
            _ => self.store.get(StorageKeys::REFRESH_TOKEN).await?,
        };

        let Some(refresh_token) = refresh_token else {
            self.force_expire().await?;
            return Err(AuthError::domain_with_message(
                DomainCode::LoginRequired,
                "no refresh token available",
            ));
        };

        debug!("refreshing session tokens");

        let payload: TokenPayload = match self
            .api
            .post(
                &self.endpoints.tokens(),
                serde_json::json!({ "refresh_token": refresh_token }),
                None,
            )
            .await
        {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "token refresh failed, expiring session");
                self.force_expire().await?;
                return Err(e.into());
            }
        };

        let session = self.set_session(&payload).await?;
        info!("session tokens refreshed");
        self.events.notify(
            AuthEvent::TokenRefreshed,
            &session,
            self.current_user().as_ref(),
        );
        Ok(session)
    }

    /// One proactive-refresh tick.
    async fn tick(self: &Arc<Self>) {
        let Some(expires_at) = self.current().access_expires_at() else {
            return;
        };
        let remaining = ticks_remaining(expires_at, Utc::now(), self.config.refresh_interval);
        if remaining <= self.config.refresh_threshold_ticks {
            debug!(ticks_remaining = remaining, "proactive refresh tick");
            if let Err(e) = self.refresh().await {
                warn!(error = %e, "proactive refresh failed");
            }
        }
    }

    /// Start the background refresh ticker, gated by host visibility.
    ///
    /// While `visibility` reads `false` the ticker is parked; on regaining
    /// visibility it ticks immediately and, when configured, re-fetches the
    /// session from the server. Replaces any previously running ticker.
    pub fn start_auto_refresh(self: &Arc<Self>, mut visibility: watch::Receiver<bool>) {
        if !self.config.proactive_refresh {
            return;
        }

        let manager = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(manager.config.refresh_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first interval tick fires immediately; skip it so ticks
            // line up with the configured cadence.
            ticker.tick().await;

            loop {
                if !*visibility.borrow() {
                    // Hidden: park until the watch changes.
                    if visibility.changed().await.is_err() {
                        break;
                    }
                    if !*visibility.borrow() {
                        continue;
                    }
                    debug!("host visible again, resuming refresh ticker");
                    ticker.reset();
                    if manager.config.refetch_on_wake {
                        match manager.get_session(true).await {
                            Ok(session) => manager.events.notify(
                                AuthEvent::SessionRefetch,
                                &session,
                                manager.current_user().as_ref(),
                            ),
                            Err(e) => warn!(error = %e, "session refetch on wake failed"),
                        }
                    }
                    manager.tick().await;
                    continue;
                }

                tokio::select! {
                    _ = ticker.tick() => {
                        manager.tick().await;
                    }
                    changed = visibility.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        if let Some(previous) = self.ticker.lock().unwrap().replace(handle) {
            previous.abort();
        }
    }

    /// Cancel the background ticker and release the visibility watch.
    pub fn stop_auto_refresh(&self) {
        if let Some(handle) = self.ticker.lock().unwrap().take() {
            handle.abort();
        }
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        if let Some(handle) = self.ticker.lock().unwrap().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{FakeApi, Route};
    use crate::token::test_tokens::jwt_with_expiry;
    use latchkey_storage::MemoryStore;

    fn payload(expires_at: DateTime<Utc>) -> TokenPayload {
        TokenPayload {
            access_token: jwt_with_expiry(expires_at),
            refresh_token: Some("refresh-1".to_string()),
            csrf_token: None,
            access_expires_at: None,
            refresh_expires_at: None,
            user: serde_json::json!({"id": "user-1"}),
            webauthn_required: false,
        }
    }

    fn manager_with(fake: &Arc<FakeApi>) -> Arc<SessionManager> {
        let config = EngineConfig::new("https://api.test", "app-1", "pk_test");
        let api = Arc::new(ApiClient::with_executor(fake.clone(), "https://api.test"));
        Arc::new(SessionManager::new(
            config,
            api,
            Endpoints::new("app-1"),
            Arc::new(MemoryStore::new()),
            Arc::new(EventEmitter::new()),
        ))
    }

    #[tokio::test]
    async fn test_set_session_is_idempotent() {
        let fake = FakeApi::new();
        let manager = manager_with(&fake);
        let payload = payload(Utc::now() + Duration::hours(1));

        let first = manager.set_session(&payload).await.unwrap();
        let second = manager.set_session(&payload).await.unwrap();

        assert_eq!(first, second);
        assert!(second.is_authenticated());
    }

    #[tokio::test]
    async fn test_authenticated_implies_access_and_expiry() {
        let fake = FakeApi::new();
        let manager = manager_with(&fake);
        let session = manager
            .set_session(&payload(Utc::now() + Duration::hours(1)))
            .await
            .unwrap();

        assert!(session.access_token().is_some());
        assert!(session.access_expires_at().is_some());
    }

    #[tokio::test]
    async fn test_undecodable_access_token_clears_session() {
        let fake = FakeApi::new();
        let manager = manager_with(&fake);

        manager
            .set_session(&payload(Utc::now() + Duration::hours(1)))
            .await
            .unwrap();

        let bad = TokenPayload {
            access_token: "garbage".to_string(),
            ..payload(Utc::now())
        };
        let err = manager.set_session(&bad).await.unwrap_err();
        assert!(matches!(
            err,
            AuthError::Domain {
                code: DomainCode::InvalidAuthToken,
                ..
            }
        ));
        assert_eq!(manager.current(), Session::Unauthenticated);
    }

    #[tokio::test]
    async fn test_server_expiry_does_not_rescue_undecodable_token() {
        let fake = FakeApi::new();
        let manager = manager_with(&fake);

        // A server-supplied expiry alone is not enough; the access token
        // itself must decode.
        let bad = TokenPayload {
            access_token: "garbage-not-a-jwt".to_string(),
            access_expires_at: Some(Utc::now() + Duration::hours(1)),
            ..payload(Utc::now())
        };
        let err = manager.set_session(&bad).await.unwrap_err();
        assert!(matches!(
            err,
            AuthError::Domain {
                code: DomainCode::InvalidAuthToken,
                ..
            }
        ));
        assert_eq!(manager.current(), Session::Unauthenticated);
    }

    #[tokio::test]
    async fn test_server_expiry_overrides_decoded_expiry() {
        let fake = FakeApi::new();
        let manager = manager_with(&fake);

        let server_expiry = Utc::now() + Duration::hours(3);
        let with_override = TokenPayload {
            access_expires_at: Some(server_expiry),
            ..payload(Utc::now() + Duration::hours(1))
        };
        let session = manager.set_session(&with_override).await.unwrap();
        assert_eq!(session.access_expires_at(), Some(server_expiry));
    }

    #[tokio::test]
    async fn test_hydrate_from_storage() {
        let fake = FakeApi::new();
        let store = Arc::new(MemoryStore::new());
        let config = EngineConfig::new("https://api.test", "app-1", "pk_test");
        let api = Arc::new(ApiClient::with_executor(fake.clone(), "https://api.test"));

        let first = Arc::new(SessionManager::new(
            config.clone(),
            api.clone(),
            Endpoints::new("app-1"),
            store.clone(),
            Arc::new(EventEmitter::new()),
        ));
        first
            .set_session(&payload(Utc::now() + Duration::hours(1)))
            .await
            .unwrap();

        // A second context over the same storage derives the same session.
        let second = Arc::new(SessionManager::new(
            config,
            api,
            Endpoints::new("app-1"),
            store,
            Arc::new(EventEmitter::new()),
        ));
        let session = second.hydrate().await.unwrap();
        assert!(session.is_authenticated());
    }

    #[tokio::test]
    async fn test_expired_storage_token_stays_unauthenticated() {
        let fake = FakeApi::new();
        let store = Arc::new(MemoryStore::new());
        let expired = jwt_with_expiry(Utc::now() - Duration::hours(1));
        store
            .set(StorageKeys::ACCESS_TOKEN, &expired, None)
            .await
            .unwrap();

        let config = EngineConfig::new("https://api.test", "app-1", "pk_test");
        let api = Arc::new(ApiClient::with_executor(fake.clone(), "https://api.test"));
        let manager = Arc::new(SessionManager::new(
            config,
            api,
            Endpoints::new("app-1"),
            store,
            Arc::new(EventEmitter::new()),
        ));

        let session = manager.hydrate().await.unwrap();
        assert_eq!(session, Session::Unauthenticated);
    }

    #[tokio::test]
    async fn test_single_flight_refresh() {
        let fake = FakeApi::new();
        let fresh = payload(Utc::now() + Duration::hours(2));
        fake.route(Route::post(
            "/v1/apps/app-1/auth/tokens",
            serde_json::to_value(&fresh).unwrap(),
        ));

        let manager = manager_with(&fake);
        manager
            .set_session(&payload(Utc::now() + Duration::minutes(1)))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..5 {
            let manager = manager.clone();
            handles.push(tokio::spawn(async move { manager.refresh().await }));
        }

        let mut sessions = Vec::new();
        for handle in handles {
            sessions.push(handle.await.unwrap().unwrap());
        }

        // Exactly one network call; every caller observed the same session.
        assert_eq!(fake.calls("/v1/apps/app-1/auth/tokens"), 1);
        assert!(sessions.windows(2).all(|pair| pair[0] == pair[1]));
    }

    #[tokio::test]
    async fn test_refresh_failure_force_expires_and_signals() {
        let fake = FakeApi::new();
        fake.route(Route::post_status("/v1/apps/app-1/auth/tokens", 401));

        let events = Arc::new(EventEmitter::new());
        let expired_events = Arc::new(Mutex::new(Vec::new()));
        let sink = expired_events.clone();
        let _sub = events.subscribe(Box::new(move |event, _, _| {
            sink.lock().unwrap().push(event);
        }));

        let config = EngineConfig::new("https://api.test", "app-1", "pk_test");
        let api = Arc::new(ApiClient::with_executor(fake.clone(), "https://api.test"));
        let manager = Arc::new(SessionManager::new(
            config,
            api,
            Endpoints::new("app-1"),
            Arc::new(MemoryStore::new()),
            events,
        ));
        manager
            .set_session(&payload(Utc::now() + Duration::minutes(1)))
            .await
            .unwrap();

        let err = manager.refresh().await.unwrap_err();
        assert!(matches!(err, AuthError::Http { status: 401, .. }));
        assert_eq!(manager.current(), Session::Unauthenticated);
        assert!(expired_events
            .lock()
            .unwrap()
            .contains(&AuthEvent::SessionExpired));
    }

    #[tokio::test]
    async fn test_refresh_without_token_requires_login() {
        let fake = FakeApi::new();
        let manager = manager_with(&fake);

        let err = manager.refresh().await.unwrap_err();
        assert!(matches!(
            err,
            AuthError::Domain {
                code: DomainCode::LoginRequired,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_get_session_refreshes_inside_margin() {
        let fake = FakeApi::new();
        let fresh = payload(Utc::now() + Duration::hours(2));
        fake.route(Route::post(
            "/v1/apps/app-1/auth/tokens",
            serde_json::to_value(&fresh).unwrap(),
        ));

        let manager = manager_with(&fake);
        // Expires inside the 10s margin.
        manager
            .set_session(&payload(Utc::now() + Duration::seconds(5)))
            .await
            .unwrap();

        let session = manager.get_session(false).await.unwrap();
        assert_eq!(fake.calls("/v1/apps/app-1/auth/tokens"), 1);
        assert!(session.access_expires_at().unwrap() > Utc::now() + Duration::hours(1));
    }

    #[tokio::test]
    async fn test_get_session_outside_margin_does_not_refresh() {
        let fake = FakeApi::new();
        let manager = manager_with(&fake);
        manager
            .set_session(&payload(Utc::now() + Duration::hours(1)))
            .await
            .unwrap();

        manager.get_session(false).await.unwrap();
        assert_eq!(fake.calls("/v1/apps/app-1/auth/tokens"), 0);
    }

    #[tokio::test]
    async fn test_server_check_rejection_expires_session() {
        let fake = FakeApi::new();
        fake.route(Route::get_status("/v1/apps/app-1/auth/me", 401));

        let manager = manager_with(&fake);
        manager
            .set_session(&payload(Utc::now() + Duration::hours(1)))
            .await
            .unwrap();

        let session = manager.get_session(true).await.unwrap();
        assert_eq!(session, Session::Unauthenticated);
    }

    #[test]
    fn test_ticks_remaining() {
        let interval = std::time::Duration::from_secs(30);
        let now = Utc::now();

        // 2 ticks away: at or below the threshold of 3, refresh fires.
        let near = ticks_remaining(now + Duration::seconds(75), now, interval);
        assert_eq!(near, 2);
        assert!(near <= 3);

        // 10 ticks away: no refresh.
        let far = ticks_remaining(now + Duration::seconds(305), now, interval);
        assert_eq!(far, 10);
        assert!(far > 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_refreshes_near_expiry() {
        let fake = FakeApi::new();
        let fresh = payload(Utc::now() + Duration::hours(2));
        fake.route(Route::post(
            "/v1/apps/app-1/auth/tokens",
            serde_json::to_value(&fresh).unwrap(),
        ));

        let manager = manager_with(&fake);
        // Two ticks from expiry at a 30s interval.
        manager
            .set_session(&payload(Utc::now() + Duration::seconds(65)))
            .await
            .unwrap();

        let (tx, rx) = watch::channel(true);
        manager.start_auto_refresh(rx);

        // First scheduled tick lands after one interval.
        tokio::time::sleep(std::time::Duration::from_secs(31)).await;
        manager.stop_auto_refresh();
        drop(tx);

        assert_eq!(fake.calls("/v1/apps/app-1/auth/tokens"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_idle_far_from_expiry() {
        let fake = FakeApi::new();
        let manager = manager_with(&fake);
        manager
            .set_session(&payload(Utc::now() + Duration::hours(1)))
            .await
            .unwrap();

        let (tx, rx) = watch::channel(true);
        manager.start_auto_refresh(rx);

        tokio::time::sleep(std::time::Duration::from_secs(95)).await;
        manager.stop_auto_refresh();
        drop(tx);

        assert_eq!(fake.calls("/v1/apps/app-1/auth/tokens"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_parked_while_hidden() {
        let fake = FakeApi::new();
        let manager = manager_with(&fake);
        manager
            .set_session(&payload(Utc::now() + Duration::seconds(65)))
            .await
            .unwrap();

        let (tx, rx) = watch::channel(false);
        manager.start_auto_refresh(rx);

        tokio::time::sleep(std::time::Duration::from_secs(120)).await;
        manager.stop_auto_refresh();
        drop(tx);

        // Hidden the whole time: no refresh attempted.
        assert_eq!(fake.calls("/v1/apps/app-1/auth/tokens"), 0);
    }
}
