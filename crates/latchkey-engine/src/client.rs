//! Authentication flow orchestrator.
//!
//! [`AuthClient`] composes the session manager, credential registry,
//! ceremony adapter, event emitter, and broadcast synchronizer as owned
//! fields and drives the sign-in/sign-up decision logic across them. Every
//! public operation returns `Result<_, AuthError>`; nothing panics across
//! this boundary.

use crate::api::{AppMetadata, Endpoints, UserLookup};
use crate::ceremony::{map_platform_exception, CredentialAdapter, UnsupportedAdapter};
use crate::config::EngineConfig;
use crate::error::{AuthError, AuthResult, DomainCode};
use crate::events::{AuthEvent, EventCallback, EventEmitter, Subscription};
use crate::magic::{MagicLinkFlow, MagicLinkStatus, PendingMagicLink};
use crate::registry::CredentialRegistry;
use crate::session::{Session, SessionManager, TokenPayload};
use crate::sync::BroadcastSync;
use latchkey_broadcast::SessionChannel;
use latchkey_storage::{
    MemoryStore, NoopStore, StorageAttributes, StorageKeys, TokenStore, REMEMBER_TTL_DAYS,
};
use latchkey_transport::{ApiClient, RequestExecutor, TransportError};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// What a sign-in style operation resolved to.
#[derive(Debug, Clone)]
pub enum SignInOutcome {
    /// Session established.
    SignedIn(Session),
    /// A magic link was issued; poll [`AuthClient::get_magic_link_status`]
    /// or wait for the user to follow it. `new_device` marks demotions.
    MagicPending(PendingMagicLink),
    /// Tokens are valid but the server expects a device-credential
    /// registration; pass the payload to
    /// [`AuthClient::sign_in_with_register_device`].
    DeviceRegistrationRequired(TokenPayload),
}

/// Magic-link status poll response. Once consumed, the server may hand the
/// polling context its own token payload.
#[derive(Debug, Clone, Deserialize)]
struct MagicLinkStatusResponse {
    status: MagicLinkStatus,
    #[serde(default)]
    token_payload: Option<TokenPayload>,
}

/// Builder for [`AuthClient`]. Hosts plug in their storage, ceremony, and
/// broadcast implementations; everything has a working default.
pub struct AuthClientBuilder {
    config: EngineConfig,
    store: Option<Arc<dyn TokenStore>>,
    adapter: Option<Arc<dyn CredentialAdapter>>,
    channel: Option<Arc<dyn SessionChannel>>,
    executor: Option<Arc<dyn RequestExecutor>>,
}

impl AuthClientBuilder {
    pub fn store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn adapter(mut self, adapter: Arc<dyn CredentialAdapter>) -> Self {
        self.adapter = Some(adapter);
        self
    }

    pub fn channel(mut self, channel: Arc<dyn SessionChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Substitute the transport executor (instrumented hosts, tests).
    pub fn executor(mut self, executor: Arc<dyn RequestExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn build(self) -> AuthClient {
        let config = self.config;

        let store: Arc<dyn TokenStore> = if !config.persistence {
            Arc::new(NoopStore::new())
        } else {
            self.store.unwrap_or_else(|| Arc::new(MemoryStore::new()))
        };

        let api = match self.executor {
            Some(executor) => ApiClient::with_executor(executor, config.base_url.clone()),
            None => ApiClient::new(config.base_url.clone(), config.publishable_key.clone()),
        };
        let api = Arc::new(api.with_reporting(config.telemetry));

        let endpoints = Endpoints::new(config.app_id.clone());
        let events = Arc::new(EventEmitter::new());
        let manager = Arc::new(SessionManager::new(
            config.clone(),
            api.clone(),
            endpoints.clone(),
            store.clone(),
            events.clone(),
        ));
        let registry = CredentialRegistry::new(store.clone());
        let adapter = self
            .adapter
            .unwrap_or_else(|| Arc::new(UnsupportedAdapter));
        let (visibility, _) = watch::channel(true);

        AuthClient {
            config,
            api,
            endpoints,
            store,
            events,
            manager,
            registry,
            adapter,
            channel: self.channel,
            sync: Mutex::new(None),
            visibility,
        }
    }
}

/// The auth engine's public face.
pub struct AuthClient {
    config: EngineConfig,
    api: Arc<ApiClient>,
    endpoints: Endpoints,
    store: Arc<dyn TokenStore>,
    events: Arc<EventEmitter>,
    manager: Arc<SessionManager>,
    registry: CredentialRegistry,
    adapter: Arc<dyn CredentialAdapter>,
    channel: Option<Arc<dyn SessionChannel>>,
    sync: Mutex<Option<BroadcastSync>>,
    visibility: watch::Sender<bool>,
}

impl AuthClient {
    pub fn builder(config: EngineConfig) -> AuthClientBuilder {
        AuthClientBuilder {
            config,
            store: None,
            adapter: None,
            channel: None,
            executor: None,
        }
    }

    pub fn new(config: EngineConfig) -> Self {
        Self::builder(config).build()
    }

    /// Bring the engine up: restore any persisted session, wire the
    /// cross-context synchronizer, and start the proactive-refresh ticker.
    pub async fn start(&self) -> AuthResult<Session> {
        if let Some(channel) = &self.channel {
            let sync = BroadcastSync::start(&self.events, channel.clone(), self.manager.clone());
            *self.sync.lock().unwrap() = Some(sync);
        }

        let session = self.manager.get_session(false).await?;
        self.manager
            .start_auto_refresh(self.visibility.subscribe());
        info!(authenticated = session.is_authenticated(), "auth engine started");
        self.events.notify(
            AuthEvent::InitialSession,
            &session,
            self.manager.current_user().as_ref(),
        );
        Ok(session)
    }

    /// Stop background work. The session itself is untouched.
    pub fn stop(&self) {
        self.manager.stop_auto_refresh();
        if let Some(sync) = self.sync.lock().unwrap().take() {
            sync.stop();
        }
    }

    /// Tell the engine whether the host is visible; the refresh ticker
    /// parks while hidden.
    pub fn set_visible(&self, visible: bool) {
        let _ = self.visibility.send(visible);
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current session snapshot, refreshed if stale.
    pub async fn get_session(&self, server_check: bool) -> AuthResult<Session> {
        self.manager.get_session(server_check).await
    }

    /// Subscribe to auth-state changes. The callback immediately receives
    /// an `InitialSession` snapshot, then every subsequent transition.
    pub fn on_auth_state_change(&self, callback: EventCallback) -> Subscription {
        let session = self.manager.current();
        let user = self.manager.current_user();
        callback(AuthEvent::InitialSession, &session, user.as_ref());
        self.events.subscribe(callback)
    }

    /// App metadata (enabled auth methods, display configuration).
    pub async fn app_metadata(&self) -> AuthResult<AppMetadata> {
        Ok(self
            .api
            .get(&self.endpoints.app_metadata(), None)
            .await?)
    }

    /// The identifier remembered from the last successful login, for
    /// pre-filling sign-in forms. Independent of the token lifecycle.
    pub async fn remembered_identifier(&self) -> AuthResult<Option<String>> {
        Ok(self.store.get(StorageKeys::REMEMBERED_IDENTIFIER).await?)
    }

    // ---- sign-in / sign-up decision logic ----

    /// Sign an existing user in. Unknown identifiers are rejected.
    pub async fn sign_in(&self, identifier: &str) -> AuthResult<SignInOutcome> {
        match self.lookup(identifier).await? {
            Some(user) => self.sign_in_known(&user).await,
            None => Err(AuthError::domain(DomainCode::IdentifierNotRecognized)),
        }
    }

    /// Register a new user. Known identifiers are rejected.
    pub async fn sign_up(&self, identifier: &str) -> AuthResult<SignInOutcome> {
        if self.lookup(identifier).await?.is_some() {
            return Err(AuthError::domain(DomainCode::IdentifierAlreadyExists));
        }
        let link = self.send_register_magic_link(identifier).await?;
        Ok(SignInOutcome::MagicPending(link))
    }

    /// Sign in when the identifier is known, register otherwise.
    pub async fn sign_in_or_up(&self, identifier: &str) -> AuthResult<SignInOutcome> {
        match self.lookup(identifier).await? {
            Some(user) => self.sign_in_known(&user).await,
            None => {
                debug!("unknown identifier, handing off to registration");
                let link = self.send_register_magic_link(identifier).await?;
                Ok(SignInOutcome::MagicPending(link))
            }
        }
    }

    async fn sign_in_known(&self, user: &UserLookup) -> AuthResult<SignInOutcome> {
        if user.webauthn_enabled && self.adapter.is_supported() {
            if self
                .registry
                .is_new_device(&user.id, &user.credential_ids)
                .await?
            {
                // Unknown device: demote to a magic link rather than running
                // a ceremony doomed to fail.
                debug!(user_id = %user.id, "device unknown for user, demoting to magic link");
                let link = self.send_magic_link(&user.identifier, "login", true).await?;
                return Ok(SignInOutcome::MagicPending(link));
            }
            let session = self.sign_in_with_verify_device(&user.identifier).await?;
            return Ok(SignInOutcome::SignedIn(session));
        }

        let link = self.send_login_magic_link(&user.identifier).await?;
        Ok(SignInOutcome::MagicPending(link))
    }

    async fn lookup(&self, identifier: &str) -> AuthResult<Option<UserLookup>> {
        match self
            .api
            .get::<UserLookup>(&self.endpoints.user_lookup(identifier), None)
            .await
        {
            Ok(user) => Ok(Some(user)),
            Err(TransportError::Http { status: 404, .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    // ---- magic link / OTP channel ----

    /// Issue a login magic link for a known identifier.
    pub async fn send_login_magic_link(&self, identifier: &str) -> AuthResult<PendingMagicLink> {
        self.send_magic_link(identifier, "login", false).await
    }

    /// Issue a registration magic link for a new identifier.
    pub async fn send_register_magic_link(&self, identifier: &str) -> AuthResult<PendingMagicLink> {
        self.send_magic_link(identifier, "register", false).await
    }

    async fn send_magic_link(
        &self,
        identifier: &str,
        intent: &str,
        new_device: bool,
    ) -> AuthResult<PendingMagicLink> {
        let mut link: PendingMagicLink = self
            .api
            .post(
                &self.endpoints.magic_link_send(),
                json!({ "identifier": identifier, "intent": intent, "new_device": new_device }),
                None,
            )
            .await?;
        link.new_device = new_device;

        let event = if new_device {
            AuthEvent::MagicNewDevicePending
        } else {
            AuthEvent::MagicPending
        };
        info!(intent, new_device, "magic link issued");
        self.events.notify(event, &self.manager.current(), None);
        Ok(link)
    }

    /// Poll an issued link. When the server reports it consumed and hands
    /// this context a token payload, the session is established here too.
    pub async fn get_magic_link_status(&self, id: &str) -> AuthResult<MagicLinkStatus> {
        let response: MagicLinkStatusResponse = self
            .api
            .get(&self.endpoints.magic_link_status(id), None)
            .await?;

        if response.status == MagicLinkStatus::Consumed {
            if let Some(payload) = response.token_payload {
                self.complete_sign_in(&payload, None).await?;
            }
        }
        Ok(response.status)
    }

    /// Poll an outstanding flow and advance its consumption machine.
    /// Side effects (session establishment on consumption) are the same as
    /// [`AuthClient::get_magic_link_status`].
    pub async fn poll_magic_link(&self, flow: &mut MagicLinkFlow) -> AuthResult<MagicLinkStatus> {
        let id = flow.link.id.clone();
        let status = self.get_magic_link_status(&id).await?;
        flow.apply_status(status);
        Ok(status)
    }

    /// Exchange a one-time magic-link token. When the payload expects a
    /// device-credential registration and this host can run one, the caller
    /// is directed to [`AuthClient::sign_in_with_register_device`] instead
    /// of the session being finalized here.
    pub async fn verify_magic_link(&self, token: &str) -> AuthResult<SignInOutcome> {
        self.events
            .notify(AuthEvent::MagicLoading, &self.manager.current(), None);

        let payload: TokenPayload = self
            .api
            .post(
                &self.endpoints.magic_link_verify(),
                json!({ "token": token }),
                None,
            )
            .await?;

        if payload.webauthn_required && self.adapter.is_supported() {
            debug!("magic link verified, device registration expected");
            return Ok(SignInOutcome::DeviceRegistrationRequired(payload));
        }

        let session = self.complete_sign_in(&payload, None).await?;
        Ok(SignInOutcome::SignedIn(session))
    }

    /// Full magic-link consumption: verify the token and run the follow-up
    /// device registration when one is expected.
    pub async fn sign_in_with_magic_link(&self, token: &str) -> AuthResult<Session> {
        match self.verify_magic_link(token).await? {
            SignInOutcome::SignedIn(session) => Ok(session),
            SignInOutcome::DeviceRegistrationRequired(payload) => {
                self.sign_in_with_register_device(&payload).await
            }
            SignInOutcome::MagicPending(_) => Err(AuthError::Technical(
                "magic-link verification issued another link".to_string(),
            )),
        }
    }

    /// Send a one-time code to a known identifier.
    pub async fn send_login_otp(&self, identifier: &str) -> AuthResult<()> {
        let _: Value = self
            .api
            .post(
                &self.endpoints.otp_send(),
                json!({ "identifier": identifier }),
                None,
            )
            .await?;
        info!("login code sent");
        Ok(())
    }

    /// Exchange a one-time code for a session.
    pub async fn verify_otp(&self, identifier: &str, code: &str) -> AuthResult<Session> {
        let payload: TokenPayload = self
            .api
            .post(
                &self.endpoints.otp_verify(),
                json!({ "identifier": identifier, "code": code }),
                None,
            )
            .await?;
        self.complete_sign_in(&payload, Some(identifier)).await
    }

    /// Establish a session directly from a token payload obtained out of
    /// band (server-rendered handoff, deep link).
    pub async fn sign_in_with_token_payload(&self, payload: &TokenPayload) -> AuthResult<Session> {
        self.complete_sign_in(payload, None).await
    }

    // ---- device credential ceremonies ----

    /// Assertion ceremony: prove possession of a registered credential.
    pub async fn sign_in_with_verify_device(&self, identifier: &str) -> AuthResult<Session> {
        let Some(user) = self.lookup(identifier).await? else {
            return Err(AuthError::domain(DomainCode::IdentifierNotRecognized));
        };

        let options: Value = self
            .api
            .post(
                &self.endpoints.webauthn_assert_init(),
                json!({ "user_id": user.id }),
                None,
            )
            .await?;

        let output = self.adapter.assert(&options).await.map_err(|failure| {
            let code = map_platform_exception(&failure);
            warn!(code = code.as_str(), "assertion ceremony failed");
            AuthError::ceremony(code, failure.message)
        })?;

        let payload: TokenPayload = self
            .api
            .post(
                &self.endpoints.webauthn_assert_finalize(),
                json!({
                    "user_id": user.id,
                    "credential_id": output.credential_id,
                    "response": output.response,
                }),
                None,
            )
            .await?;

        self.registry.record(&user.id, &output.credential_id).await?;
        let session = self.complete_sign_in(&payload, Some(identifier)).await?;
        self.events.notify(
            AuthEvent::BioVerify,
            &session,
            self.manager.current_user().as_ref(),
        );
        Ok(session)
    }

    /// Registration ceremony on the heels of a token payload that expects
    /// one. The payload's tokens authorize the ceremony; the session is
    /// finalized once the credential is registered.
    pub async fn sign_in_with_register_device(&self, payload: &TokenPayload) -> AuthResult<Session> {
        let session = self.manager.set_session(payload).await?;
        self.register_device_inner(&session).await?;
        let identifier = payload
            .user
            .get("identifier")
            .and_then(Value::as_str)
            .map(String::from);
        self.finish_login(&session, identifier.as_deref()).await?;
        Ok(session)
    }

    /// Register this device as a credential for the current session.
    pub async fn add_device(&self) -> AuthResult<()> {
        let session = self.manager.current();
        if !session.is_authenticated() {
            return Err(AuthError::domain(DomainCode::LoginRequired));
        }
        self.register_device_inner(&session).await
    }

    async fn register_device_inner(&self, session: &Session) -> AuthResult<()> {
        let Some(bearer) = session.access_token().map(String::from) else {
            return Err(AuthError::domain(DomainCode::LoginRequired));
        };

        let options: Value = self
            .api
            .post(
                &self.endpoints.webauthn_register_init(),
                json!({}),
                Some(&bearer),
            )
            .await?;

        let output = self.adapter.register(&options).await.map_err(|failure| {
            let code = map_platform_exception(&failure);
            warn!(code = code.as_str(), "registration ceremony failed");
            AuthError::ceremony(code, failure.message)
        })?;

        let _: Value = self
            .api
            .post(
                &self.endpoints.webauthn_register_finalize(),
                json!({
                    "credential_id": output.credential_id,
                    "response": output.response,
                }),
                Some(&bearer),
            )
            .await?;

        if let Some(user_id) = self
            .manager
            .current_user()
            .as_ref()
            .and_then(|user| user.get("id"))
            .and_then(Value::as_str)
        {
            self.registry.record(user_id, &output.credential_id).await?;
        }
        info!("device credential registered");
        self.events.notify(
            AuthEvent::BioRegister,
            &self.manager.current(),
            self.manager.current_user().as_ref(),
        );
        Ok(())
    }

    // ---- session teardown ----

    /// End the session. Best-effort server revocation; local state is
    /// cleared regardless. The remembered identifier survives.
    pub async fn sign_out(&self) -> AuthResult<()> {
        if let Some(bearer) = self.manager.current().access_token().map(String::from) {
            if let Err(e) = self
                .api
                .request_raw(
                    latchkey_transport::Verb::Post,
                    &self.endpoints.sign_out(),
                    None,
                    Some(&bearer),
                )
                .await
            {
                warn!(error = %e, "server sign-out failed, clearing locally anyway");
            }
        }
        self.manager.clear().await?;
        info!("signed out");
        self.events
            .notify(AuthEvent::SignOut, &Session::Unauthenticated, None);
        Ok(())
    }

    // ---- shared completion ----

    /// Apply a payload, remember the identifier, and announce the sign-in.
    async fn complete_sign_in(
        &self,
        payload: &TokenPayload,
        identifier: Option<&str>,
    ) -> AuthResult<Session> {
        let session = self.manager.set_session(payload).await?;
        let identifier = identifier.map(String::from).or_else(|| {
            payload
                .user
                .get("identifier")
                .and_then(Value::as_str)
                .map(String::from)
        });
        self.finish_login(&session, identifier.as_deref()).await?;
        Ok(session)
    }

    async fn finish_login(&self, session: &Session, identifier: Option<&str>) -> AuthResult<()> {
        if let Some(identifier) = identifier {
            self.store
                .set(
                    StorageKeys::REMEMBERED_IDENTIFIER,
                    identifier,
                    Some(&StorageAttributes::long_lived(REMEMBER_TTL_DAYS)),
                )
                .await?;
        }
        info!("signed in");
        self.events.notify(
            AuthEvent::SignIn,
            session,
            self.manager.current_user().as_ref(),
        );
        Ok(())
    }
}
