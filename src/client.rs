//! High-level client: one object per user that owns configuration,
//! credentials, the chat session and the dispatcher

use crate::api::{ApiRequest, ClientError, HttpTransport, Transport};
use crate::auth::{AuthState, CredentialStore, Credentials, FileCredentialStore, SessionManager};
use crate::chat::{normalize_products, NormalizedResponse, ProductResult, QueryDispatcher, QueryRequest};
use crate::config::Config;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

/// Result of a successful registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignupReceipt {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryMessage {
    pub role: String,
    pub content: String,
    pub products: Vec<ProductResult>,
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatHistory {
    pub session_id: String,
    pub messages: Vec<HistoryMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status.eq_ignore_ascii_case("healthy") || self.status.eq_ignore_ascii_case("ok")
    }
}

pub struct ShopClient {
    session: Arc<SessionManager>,
    dispatcher: QueryDispatcher,
    default_limit: u32,
}

impl ShopClient {
    /// Build the production client: reqwest transport plus the file store
    pub fn from_config(config: &Config) -> Result<Self, ClientError> {
        config.validate()?;
        let transport = HttpTransport::new(&config.api_base()?)?;

        let store = FileCredentialStore::for_config(&config.auth)
            .map_err(|e| ClientError::Configuration(e.to_string()))?;
        tracing::debug!("Credential store at {:?}", store.path());

        Ok(Self::with_transport(
            config,
            Arc::new(store),
            Arc::new(transport),
        ))
    }

    /// Build a client over any transport and store
    ///
    /// `transport` is wrapped by the session manager's expiry interceptor.
    pub fn with_transport(
        config: &Config,
        store: Arc<dyn CredentialStore>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let session = Arc::new(SessionManager::new(&config.auth, store, transport));
        let dispatcher =
            QueryDispatcher::new(session.clone()).with_default_category(config.query.category.clone());

        Self {
            session,
            dispatcher,
            default_limit: config.query.default_limit,
        }
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn state(&self) -> AuthState {
        self.session.state()
    }

    /// Configured result-count limit for requests that set none
    pub fn default_limit(&self) -> u32 {
        self.default_limit
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<Credentials, ClientError> {
        self.session.login(username, password).await
    }

    pub fn logout(&self) {
        self.session.logout();
    }

    /// Register a new account
    ///
    /// Does not log in; call [`ShopClient::login`] afterwards.
    pub async fn signup(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<SignupReceipt, ClientError> {
        let username = username.trim();
        let email = email.trim();
        validate_signup(username, email, password)?;

        let request = ApiRequest::post("/auth/signup")
            .with_json(json!({
                "username": username,
                "email": email,
                "password": password,
            }))
            .as_credential_exchange();

        let response = self.session.transport().execute(request).await?;
        if !response.is_success() {
            return Err(ClientError::Authentication(response.error_message("Signup")));
        }

        let receipt: SignupReceipt = response.json().map_err(|e| {
            ClientError::Authentication(format!("unexpected signup response: {}", e))
        })?;
        tracing::info!("Registered user {}", username);
        Ok(receipt)
    }

    pub async fn dispatch(&self, request: QueryRequest) -> Result<NormalizedResponse, ClientError> {
        self.dispatcher.dispatch(request).await
    }

    /// Conversation history of the current chat session
    pub async fn history(&self) -> Result<ChatHistory, ClientError> {
        let session_id = self.session.session_id().ok_or_else(|| {
            ClientError::Configuration("no active chat session".to_string())
        })?;
        self.history_of(&session_id).await
    }

    /// Conversation history of any session owned by the logged-in user
    pub async fn history_of(&self, session_id: &str) -> Result<ChatHistory, ClientError> {
        let path = history_path(session_id)?;
        let token = self.session.ensure_authenticated().await?;
        let request = ApiRequest::get(path).with_bearer(token);

        let response = self.session.transport().execute(request).await?;
        if !response.is_success() {
            return Err(ClientError::Query(response.error_message("History")));
        }

        Ok(parse_history(session_id, &response.body))
    }

    /// Backend liveness; needs no login
    pub async fn health(&self) -> Result<HealthStatus, ClientError> {
        let response = self
            .session
            .transport()
            .execute(ApiRequest::get("/health"))
            .await?;
        if !response.is_success() {
            return Err(ClientError::Query(response.error_message("Health check")));
        }

        response
            .json()
            .map_err(|e| ClientError::Query(format!("unexpected health response: {}", e)))
    }
}

/// Same constraints the backend's signup model enforces
fn validate_signup(username: &str, email: &str, password: &str) -> Result<(), ClientError> {
    let len = username.chars().count();
    if !(3..=50).contains(&len) {
        return Err(ClientError::Authentication(
            "username must be between 3 and 50 characters".to_string(),
        ));
    }
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {}
        _ => {
            return Err(ClientError::Authentication(format!(
                "'{}' is not a valid email address",
                email
            )))
        }
    }
    if password.chars().count() < 6 {
        return Err(ClientError::Authentication(
            "password must be at least 6 characters".to_string(),
        ));
    }
    Ok(())
}

/// `/chat/history/{id}` with the id encoded as a single path segment
fn history_path(session_id: &str) -> Result<String, ClientError> {
    if matches!(session_id.trim(), "" | "." | "..") {
        return Err(ClientError::Configuration(format!(
            "'{}' is not a valid session id",
            session_id
        )));
    }

    let mut url = url::Url::parse("http://localhost/chat/history")
        .map_err(|e| ClientError::Configuration(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| ClientError::Configuration("history URL cannot have a path".to_string()))?
        .push(session_id);
    Ok(url.path().to_string())
}

fn parse_history(session_id: &str, body: &Value) -> ChatHistory {
    let messages = body
        .get("messages")
        .and_then(Value::as_array)
        .map(|messages| {
            messages
                .iter()
                .filter_map(|message| {
                    let role = message.get("role").and_then(Value::as_str)?;
                    Some(HistoryMessage {
                        role: role.to_string(),
                        content: message
                            .get("content")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        products: message
                            .get("products")
                            .map(normalize_products)
                            .unwrap_or_default(),
                        timestamp: message
                            .get("timestamp")
                            .and_then(Value::as_str)
                            .map(str::to_string),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    ChatHistory {
        session_id: body
            .get("session_id")
            .and_then(Value::as_str)
            .unwrap_or(session_id)
            .to_string(),
        messages,
    }
}
