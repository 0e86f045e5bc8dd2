//! Session Manager - login and chat-session lifecycle
//!
//! State machine:
//!
//! ```text
//! Anonymous -> Authenticating -> Authenticated { has_session: false }
//!                                    -> Authenticated { has_session: true }
//! (401 anywhere) -> Expired -> Anonymous (on the next login attempt)
//! ```
//!
//! Credentials and the session id live behind one lock together with an
//! auth generation counter. Every credential change bumps the generation
//! and drops the session id, and a session created under an older
//! generation is discarded instead of stored. A session id can therefore
//! never be paired with credentials other than the ones it was opened with.
//!
//! Logins are keyed by a separate login epoch. Invalidation leaves the epoch
//! alone, so 401s arriving while a login is in flight never start a second
//! one. Only an explicit `login` opens a new epoch, and a login that finishes
//! under an older epoch is dropped instead of installed.

use super::{CredentialStore, Credentials, SingleFlight};
use crate::api::{
    ApiRequest, AuthExpiryInterceptor, ClientError, ExpiryHandler, Transport,
};
use crate::config::AuthConfig;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Observable authentication state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Anonymous,
    Authenticating,
    Authenticated { has_session: bool },
    /// Credentials were revoked by a 401; cleared on the next login attempt
    Expired,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    access_token: String,
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    session_id: String,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Clone)]
struct LoginCredentials {
    username: String,
    password: String,
}

impl std::fmt::Debug for LoginCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Default)]
struct AuthSlot {
    credentials: Option<Credentials>,
    session_id: Option<String>,
    generation: u64,
    login_epoch: u64,
    logins_in_flight: u32,
    expired: bool,
}

/// State shared between the manager, its in-flight operations and the
/// expiry interceptor
struct SharedAuth {
    slot: Mutex<AuthSlot>,
    store: Arc<dyn CredentialStore>,
}

impl SharedAuth {
    fn lock(&self) -> MutexGuard<'_, AuthSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn token(&self) -> Option<String> {
        self.lock()
            .credentials
            .as_ref()
            .map(|c| c.access_token.clone())
    }

    fn begin_login(&self) {
        self.lock().logins_in_flight += 1;
    }

    fn end_login(&self) {
        let mut slot = self.lock();
        slot.logins_in_flight = slot.logins_in_flight.saturating_sub(1);
    }

    /// Replace credentials obtained under `epoch`; the old session (if any)
    /// is gone. Returns false when a newer login superseded this one.
    fn install(&self, credentials: Credentials, epoch: u64) -> bool {
        {
            let mut slot = self.lock();
            if slot.login_epoch != epoch {
                return false;
            }
            slot.generation += 1;
            slot.credentials = Some(credentials.clone());
            slot.session_id = None;
            slot.expired = false;
        }
        self.store.save(&credentials);
        true
    }

    fn invalidate(&self, expired: bool) {
        {
            let mut slot = self.lock();
            Self::reset(&mut slot, expired);
        }
        self.store.clear();
    }

    /// Drop the current login and open a new login epoch
    fn supersede(&self) -> u64 {
        let epoch = {
            let mut slot = self.lock();
            Self::reset(&mut slot, false);
            slot.login_epoch += 1;
            slot.login_epoch
        };
        self.store.clear();
        epoch
    }

    fn reset(slot: &mut AuthSlot, expired: bool) {
        slot.generation += 1;
        slot.credentials = None;
        slot.session_id = None;
        slot.expired = expired;
    }

    /// Session id for `generation`, if one was already stored
    fn session_for(&self, generation: u64) -> Option<String> {
        let slot = self.lock();
        if slot.generation == generation {
            slot.session_id.clone()
        } else {
            None
        }
    }

    /// Store a session id unless the credentials changed meanwhile
    fn store_session(&self, generation: u64, session_id: &str) -> bool {
        let mut slot = self.lock();
        if slot.generation != generation || slot.credentials.is_none() {
            return false;
        }
        slot.session_id = Some(session_id.to_string());
        true
    }
}

impl ExpiryHandler for SharedAuth {
    fn on_auth_expired(&self) {
        self.invalidate(true);
    }
}

/// Owns the access token and the chat session id
pub struct SessionManager {
    shared: Arc<SharedAuth>,
    transport: Arc<dyn Transport>,
    login: Option<LoginCredentials>,
    login_flight: SingleFlight<Result<String, ClientError>>,
    session_flight: SingleFlight<Result<String, ClientError>>,
}

impl SessionManager {
    /// Create a manager over `transport`
    ///
    /// The transport is wrapped in an `AuthExpiryInterceptor` bound to this
    /// manager's state; use [`SessionManager::transport`] for every other
    /// backend call so 401s are handled uniformly.
    ///
    /// Initial credentials come from `auth.token` when configured, otherwise
    /// from whatever `store` persisted earlier.
    pub fn new(
        auth: &AuthConfig,
        store: Arc<dyn CredentialStore>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let username = auth.username.clone().filter(|u| !u.trim().is_empty());
        let password = auth.password.clone().filter(|p| !p.is_empty());

        let credentials = match auth.token.as_deref().filter(|t| !t.trim().is_empty()) {
            Some(token) => {
                tracing::debug!("Using pre-supplied access token");
                let mut creds = Credentials::new(token);
                creds.username = username.clone();
                Some(creds)
            }
            None => store.load(),
        };

        let login = match (username, password) {
            (Some(username), Some(password)) => Some(LoginCredentials { username, password }),
            _ => None,
        };

        let shared = Arc::new(SharedAuth {
            slot: Mutex::new(AuthSlot {
                credentials,
                ..AuthSlot::default()
            }),
            store,
        });

        let transport: Arc<dyn Transport> =
            Arc::new(AuthExpiryInterceptor::new(transport, shared.clone()));

        Self {
            shared,
            transport,
            login,
            login_flight: SingleFlight::new(),
            session_flight: SingleFlight::new(),
        }
    }

    /// The expiry-intercepted transport all backend calls must go through
    pub fn transport(&self) -> Arc<dyn Transport> {
        self.transport.clone()
    }

    pub fn state(&self) -> AuthState {
        let slot = self.shared.lock();
        if slot.logins_in_flight > 0 {
            AuthState::Authenticating
        } else if slot.credentials.is_some() {
            AuthState::Authenticated {
                has_session: slot.session_id.is_some(),
            }
        } else if slot.expired {
            AuthState::Expired
        } else {
            AuthState::Anonymous
        }
    }

    pub fn credentials(&self) -> Option<Credentials> {
        self.shared.lock().credentials.clone()
    }

    pub fn session_id(&self) -> Option<String> {
        self.shared.lock().session_id.clone()
    }

    /// Return the cached token, logging in with the configured
    /// username/password when there is none
    ///
    /// Concurrent callers share a single login request.
    pub async fn ensure_authenticated(&self) -> Result<String, ClientError> {
        let epoch = {
            let mut slot = self.shared.lock();
            if let Some(creds) = &slot.credentials {
                return Ok(creds.access_token.clone());
            }
            if slot.expired {
                tracing::debug!("Auth state: expired -> anonymous");
                slot.expired = false;
            }
            slot.login_epoch
        };

        let Some(login) = self.login.clone() else {
            return Err(ClientError::Configuration(
                "no stored credentials and no username/password configured".to_string(),
            ));
        };

        let shared = self.shared.clone();
        let transport = self.transport.clone();
        self.login_flight
            .run(epoch, move || Self::login_exchange(shared, transport, login, epoch))
            .await
    }

    /// Log in with explicit credentials, replacing any previous login
    pub async fn login(&self, username: &str, password: &str) -> Result<Credentials, ClientError> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(ClientError::Configuration(
                "username and password are required".to_string(),
            ));
        }

        let login = LoginCredentials {
            username: username.trim().to_string(),
            password: password.to_string(),
        };
        let epoch = self.shared.supersede();
        let shared = self.shared.clone();
        let transport = self.transport.clone();
        let token = self
            .login_flight
            .run(epoch, move || Self::login_exchange(shared, transport, login, epoch))
            .await?;

        match self.credentials() {
            Some(creds) if creds.access_token == token => Ok(creds),
            _ => Err(ClientError::Authentication(
                "login superseded by a newer login".to_string(),
            )),
        }
    }

    async fn login_exchange(
        shared: Arc<SharedAuth>,
        transport: Arc<dyn Transport>,
        login: LoginCredentials,
        epoch: u64,
    ) -> Result<String, ClientError> {
        // A flight that completed right before this one was registered
        if let Some(token) = shared.token() {
            return Ok(token);
        }

        shared.begin_login();
        let result = Self::request_login(transport.as_ref(), &login).await;
        shared.end_login();

        let credentials = result?;
        let token = credentials.access_token.clone();
        if !shared.install(credentials.clone(), epoch) {
            tracing::warn!("Discarding login for {}: a newer login started", login.username);
            return Err(ClientError::Authentication(
                "login superseded by a newer login".to_string(),
            ));
        }
        tracing::info!(
            "Logged in as {} (token {})",
            login.username,
            credentials.token_preview()
        );
        Ok(token)
    }

    async fn request_login(
        transport: &dyn Transport,
        login: &LoginCredentials,
    ) -> Result<Credentials, ClientError> {
        let request = ApiRequest::post("/auth/login")
            .with_json(json!({
                "username": login.username,
                "password": login.password,
            }))
            .as_credential_exchange();

        let response = transport.execute(request).await.map_err(|e| match e {
            ClientError::Network(detail) => {
                tracing::warn!("Login request failed: {}", detail);
                ClientError::Authentication("the server could not be reached".to_string())
            }
            other => other,
        })?;

        if !response.is_success() {
            return Err(ClientError::Authentication(response.error_message("Login")));
        }

        let body: LoginResponse = response.json().map_err(|e| {
            ClientError::Authentication(format!("unexpected login response: {}", e))
        })?;

        if body.access_token.trim().is_empty() {
            return Err(ClientError::Authentication(
                "login response carried an empty access token".to_string(),
            ));
        }

        Ok(Credentials {
            access_token: body.access_token,
            user_id: body.user_id,
            username: Some(login.username.clone()),
        })
    }

    /// Return the current chat session id, creating one when needed
    ///
    /// Requires an authenticated state. At most one session is created per
    /// login; concurrent callers share the creation request.
    pub async fn ensure_session(&self) -> Result<String, ClientError> {
        let (token, generation) = {
            let slot = self.shared.lock();
            if let Some(session_id) = &slot.session_id {
                return Ok(session_id.clone());
            }
            match &slot.credentials {
                Some(creds) => (creds.access_token.clone(), slot.generation),
                None => {
                    return Err(ClientError::Configuration(
                        "not authenticated; log in before opening a chat session".to_string(),
                    ))
                }
            }
        };

        let shared = self.shared.clone();
        let transport = self.transport.clone();
        self.session_flight
            .run(generation, move || {
                Self::create_session(shared, transport, token, generation)
            })
            .await
    }

    async fn create_session(
        shared: Arc<SharedAuth>,
        transport: Arc<dyn Transport>,
        token: String,
        generation: u64,
    ) -> Result<String, ClientError> {
        if let Some(session_id) = shared.session_for(generation) {
            return Ok(session_id);
        }

        let response = transport
            .execute(ApiRequest::post("/chat/sessions").with_bearer(token))
            .await
            .map_err(|e| match e {
                ClientError::AuthExpired => ClientError::AuthExpired,
                ClientError::Network(detail) => {
                    tracing::warn!("Session request failed: {}", detail);
                    ClientError::SessionCreation("the server could not be reached".to_string())
                }
                other => ClientError::SessionCreation(other.to_string()),
            })?;

        if !response.is_success() {
            return Err(ClientError::SessionCreation(
                response.error_message("Session creation"),
            ));
        }

        let body: SessionResponse = response.json().map_err(|_| {
            ClientError::SessionCreation("response did not include a session_id".to_string())
        })?;

        if body.session_id.trim().is_empty() {
            return Err(ClientError::SessionCreation(
                "backend returned an empty session_id".to_string(),
            ));
        }

        if !shared.store_session(generation, &body.session_id) {
            tracing::warn!("Credentials changed while the session was being created");
            return Err(ClientError::AuthExpired);
        }

        tracing::info!(
            "Chat session {} ready{}",
            body.session_id,
            body.message
                .map(|m| format!(" ({})", m))
                .unwrap_or_default()
        );
        Ok(body.session_id)
    }

    /// Forced invalidation: drop token, identity and session id
    ///
    /// Leaves the manager in `Expired` until the next login attempt.
    pub fn invalidate(&self) {
        tracing::info!("Invalidating credentials and chat session");
        self.shared.invalidate(true);
    }

    /// User-initiated logout
    pub fn logout(&self) {
        tracing::info!("Logging out");
        self.shared.invalidate(false);
    }

    /// Record activity for the credential store's expiry heuristics
    pub fn record_activity(&self) {
        self.shared.store.mark_active(Utc::now());
    }

    pub fn last_active(&self) -> Option<DateTime<Utc>> {
        self.shared.store.last_active()
    }
}
