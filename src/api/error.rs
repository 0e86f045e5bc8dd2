//! Typed errors for backend operations
//!
//! Every public operation of the client returns `ClientError`, so callers
//! can tell an expired login apart from a bad query without string matching:
//! - `Configuration` - missing base URL or credentials; fatal
//! - `Authentication` - login rejected; the user must re-submit
//! - `SessionCreation` - chat session could not be opened; retryable
//! - `Query` - the backend rejected a query (or its input was invalid)
//! - `AuthExpired` - a 401 forced local credentials to be dropped
//! - `Network` - connectivity failure

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// Missing or malformed configuration (base URL, credentials)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Login exchange failed (bad credentials, non-2xx, unreachable server)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The backend did not hand out a session id
    ///
    /// Local state stays authenticated, so `ensure_session` can be retried.
    #[error("Session creation failed: {0}")]
    SessionCreation(String),

    /// Query rejected by the backend or by local input validation
    #[error("Query failed: {0}")]
    Query(String),

    /// The backend answered 401; credentials and session were invalidated
    #[error("Authorization expired, please log in again")]
    AuthExpired,

    /// Connection-level failure
    ///
    /// The inner string carries the transport detail for logs; the
    /// display message stays generic.
    #[error("Network error: the shopping service could not be reached")]
    Network(String),
}

impl ClientError {
    /// Whether calling the same operation again may succeed without user action
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::SessionCreation(_) | ClientError::Network(_))
    }

    /// Whether the user has to log in (again) before continuing
    pub fn needs_reauth(&self) -> bool {
        matches!(
            self,
            ClientError::AuthExpired | ClientError::Authentication(_)
        )
    }

    /// Convert network/connection errors into a typed `ClientError`
    pub fn from_network_error(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ClientError::Network(format!("Request timeout: {}", e))
        } else if e.is_connect() {
            ClientError::Network(format!("Connection failed: {}", e))
        } else if e.is_builder() {
            ClientError::Configuration(format!("Invalid request: {}", e))
        } else {
            ClientError::Network(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_variants() {
        assert!(ClientError::SessionCreation("503".into()).is_retryable());
        assert!(ClientError::Network("refused".into()).is_retryable());
        assert!(!ClientError::AuthExpired.is_retryable());
        assert!(!ClientError::Configuration("no base".into()).is_retryable());
    }

    #[test]
    fn test_reauth_variants() {
        assert!(ClientError::AuthExpired.needs_reauth());
        assert!(ClientError::Authentication("bad password".into()).needs_reauth());
        assert!(!ClientError::Query("empty".into()).needs_reauth());
    }

    #[test]
    fn test_network_display_hides_detail() {
        let err = ClientError::Network("dns error: 10.0.0.3 unreachable".to_string());
        assert!(!err.to_string().contains("10.0.0.3"));
    }

    #[test]
    fn test_error_display() {
        let err = ClientError::Query("Query cannot be empty".to_string());
        assert_eq!(err.to_string(), "Query failed: Query cannot be empty");
    }
}
