//! Authentication and chat-session lifecycle
//!
//! - `CredentialStore` persists the access token and user identity
//! - `SessionManager` decides when to log in and when to open a chat session
//! - `SingleFlight` lets concurrent callers share one in-flight login or
//!   session creation

mod credential_store;
mod session;
mod single_flight;

pub use credential_store::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use session::{AuthState, SessionManager};
pub use single_flight::SingleFlight;

use serde::{Deserialize, Serialize};

/// Minimal user identity kept next to the token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Identity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

impl Identity {
    pub fn is_empty(&self) -> bool {
        self.user_id.is_none() && self.username.is_none()
    }
}

/// Access token plus the identity it was issued to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub access_token: String,
    pub user_id: Option<String>,
    pub username: Option<String>,
}

impl Credentials {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            user_id: None,
            username: None,
        }
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn identity(&self) -> Identity {
        Identity {
            user_id: self.user_id.clone(),
            username: self.username.clone(),
        }
    }

    /// A token and at least one identity field; only complete credentials
    /// may be persisted
    pub fn is_complete(&self) -> bool {
        !self.access_token.trim().is_empty() && !self.identity().is_empty()
    }

    /// Token preview safe for logs and terminal output
    pub fn token_preview(&self) -> String {
        let visible: String = self.access_token.chars().take(8).collect();
        format!("{}...", visible)
    }
}
