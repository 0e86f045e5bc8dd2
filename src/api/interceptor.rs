//! Auth-expiry interceptor
//!
//! Decorates a `Transport`. A 401 from any call (other than the login or
//! signup exchange itself) invalidates local credentials and session before
//! the error reaches the caller, and the caller sees `ClientError::AuthExpired`.
//! Nothing is retried with the stale token.

use super::{ApiRequest, ApiResponse, ClientError, Transport};
use async_trait::async_trait;
use std::sync::Arc;

/// Receives the forced invalidation when the backend rejects a token
pub trait ExpiryHandler: Send + Sync {
    fn on_auth_expired(&self);
}

pub struct AuthExpiryInterceptor {
    inner: Arc<dyn Transport>,
    handler: Arc<dyn ExpiryHandler>,
}

impl AuthExpiryInterceptor {
    pub fn new(inner: Arc<dyn Transport>, handler: Arc<dyn ExpiryHandler>) -> Self {
        Self { inner, handler }
    }
}

#[async_trait]
impl Transport for AuthExpiryInterceptor {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, ClientError> {
        let credential_exchange = request.credential_exchange;
        let method = request.method;
        let path = request.path.clone();

        let response = self.inner.execute(request).await?;

        if response.status == 401 && !credential_exchange {
            tracing::warn!(
                "{} {} returned 401, invalidating credentials and session",
                method,
                path
            );
            self.handler.on_auth_expired();
            return Err(ClientError::AuthExpired);
        }

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::MockTransport;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingHandler {
        calls: AtomicUsize,
    }

    impl ExpiryHandler for CountingHandler {
        fn on_auth_expired(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn setup(status: u16) -> (AuthExpiryInterceptor, Arc<CountingHandler>) {
        let mock = Arc::new(MockTransport::new(move |_req| {
            Ok(ApiResponse::new(status, json!({"detail": "Could not validate credentials"})))
        }));
        let handler = Arc::new(CountingHandler::default());
        (AuthExpiryInterceptor::new(mock, handler.clone()), handler)
    }

    #[tokio::test]
    async fn test_401_invalidates_and_surfaces_expiry() {
        let (interceptor, handler) = setup(401);
        let err = interceptor
            .execute(ApiRequest::post("/chat/query").with_bearer("stale"))
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::AuthExpired));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_login_401_passes_through() {
        let (interceptor, handler) = setup(401);
        let resp = interceptor
            .execute(ApiRequest::post("/auth/login").as_credential_exchange())
            .await
            .unwrap();

        assert_eq!(resp.status, 401);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_other_errors_untouched() {
        let (interceptor, handler) = setup(500);
        let resp = interceptor
            .execute(ApiRequest::get("/health"))
            .await
            .unwrap();

        assert_eq!(resp.status, 500);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    }
}
