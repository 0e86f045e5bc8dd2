//! Query Dispatcher - turns a `QueryRequest` into a backend call
//!
//! Every dispatch runs the same pipeline in order: authenticate, make sure a
//! chat session exists, shape the modality-specific request, send it through
//! the expiry-intercepted transport and normalize the answer.

use super::normalize::{normalize_response, NormalizedResponse};
use super::request::{ImagePayload, Modality, QueryRequest};
use crate::api::{ApiRequest, ClientError, FormField, Transport};
use crate::auth::SessionManager;
use serde_json::json;
use std::sync::Arc;

pub struct QueryDispatcher {
    session: Arc<SessionManager>,
    transport: Arc<dyn Transport>,
    default_category: Option<String>,
}

impl QueryDispatcher {
    pub fn new(session: Arc<SessionManager>) -> Self {
        let transport = session.transport();
        Self {
            session,
            transport,
            default_category: None,
        }
    }

    /// Category applied to requests that carry none
    pub fn with_default_category(mut self, category: Option<String>) -> Self {
        self.default_category = category.filter(|c| !c.trim().is_empty());
        self
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub async fn dispatch(&self, request: QueryRequest) -> Result<NormalizedResponse, ClientError> {
        self.session.record_activity();

        let token = self.session.ensure_authenticated().await?;
        let session_id = self.session.ensure_session().await?;

        let api_request = self.shape(&request, &session_id)?.with_bearer(token);
        tracing::debug!(
            "Dispatching {} query to {} (limit {})",
            request.modality,
            api_request.path,
            request.limit
        );

        let response = self.transport.execute(api_request).await?;
        if !response.is_success() {
            let message = response.error_message("Query");
            tracing::warn!("Query rejected with HTTP {}: {}", response.status, message);
            return Err(ClientError::Query(message));
        }

        let normalized = normalize_response(&response.body);
        tracing::debug!("Query returned {} products", normalized.products.len());
        Ok(normalized)
    }

    fn category<'a>(&'a self, request: &'a QueryRequest) -> Option<&'a str> {
        request
            .category_filter()
            .or(self.default_category.as_deref())
    }

    /// Build the modality-specific request
    fn shape(&self, request: &QueryRequest, session_id: &str) -> Result<ApiRequest, ClientError> {
        let category = self.category(request);

        match request.modality {
            Modality::Text => {
                let query = required_query(request)?;
                let mut body = json!({
                    "session_id": session_id,
                    "query": query,
                    "limit": request.limit.get(),
                });
                if let Some(category) = category {
                    body["category"] = json!(category);
                }
                Ok(ApiRequest::post("/chat/query").with_json(body))
            }
            Modality::Image | Modality::TextImage => {
                let query = match request.modality {
                    Modality::TextImage => Some(required_query(request)?),
                    _ => request.query_text(),
                };
                let image = required_image(request)?;

                let mut fields = vec![FormField::text("session_id", session_id)];
                if let Some(query) = query {
                    fields.push(FormField::text("query", query));
                }
                if let Some(category) = category {
                    fields.push(FormField::text("category", category));
                }
                fields.push(image_field(image));
                Ok(ApiRequest::post("/chat/image-query").with_multipart(fields))
            }
            Modality::Similarity => {
                let image = request
                    .image
                    .as_ref()
                    .map(|image| image.resolve())
                    .transpose()?;
                let query = request.query_text();
                if query.is_none() && image.is_none() {
                    return Err(ClientError::Query(
                        "similarity search needs a description or an image".to_string(),
                    ));
                }

                let mut fields = vec![
                    FormField::text("session_id", session_id),
                    FormField::text("query", query.unwrap_or_default()),
                    FormField::text("limit", request.limit.to_string()),
                ];
                if let Some(category) = category {
                    fields.push(FormField::text("category", category));
                }
                if let Some(image) = image {
                    fields.push(image_field(image));
                }
                Ok(ApiRequest::post("/products/search").with_multipart(fields))
            }
        }
    }
}

fn required_query(request: &QueryRequest) -> Result<&str, ClientError> {
    request.query_text().ok_or_else(|| {
        ClientError::Query(format!("{} query text cannot be empty", request.modality))
    })
}

fn required_image(request: &QueryRequest) -> Result<ImagePayload, ClientError> {
    request
        .image
        .as_ref()
        .ok_or_else(|| ClientError::Query(format!("{} query needs an image", request.modality)))?
        .resolve()
}

fn image_field(image: ImagePayload) -> FormField {
    FormField::file("image", image.bytes, &image.file_name, &image.mime_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::MockTransport;
    use crate::api::{ApiResponse, FormValue, RequestBody};
    use crate::auth::{AuthState, MemoryCredentialStore};
    use crate::chat::ImageInput;
    use crate::config::AuthConfig;

    fn backend(req: &ApiRequest) -> Result<ApiResponse, ClientError> {
        match req.path.as_str() {
            "/auth/login" => Ok(ApiResponse::new(
                200,
                json!({"access_token": "tok-1", "user_id": "u-1"}),
            )),
            "/chat/sessions" => Ok(ApiResponse::new(201, json!({"session_id": "sess-1"}))),
            "/chat/query" | "/chat/image-query" => Ok(ApiResponse::new(
                200,
                json!({
                    "response": "Found these",
                    "products": [
                        {"id": "p1", "name": "Gold necklace", "price": "199.99"},
                        {"id": "p1", "name": "Gold necklace (dup)"},
                    ]
                }),
            )),
            "/products/search" => Ok(ApiResponse::new(
                200,
                json!({"results": [{"id": "p9", "name": "Pearl", "similarity_score": 0.8}], "count": 1}),
            )),
            _ => Ok(ApiResponse::new(404, json!({"detail": "Not Found"}))),
        }
    }

    fn dispatcher(mock: Arc<MockTransport>) -> QueryDispatcher {
        let config = AuthConfig {
            username: Some("u".into()),
            password: Some("p".into()),
            ..AuthConfig::default()
        };
        let session = SessionManager::new(&config, Arc::new(MemoryCredentialStore::new()), mock);
        QueryDispatcher::new(Arc::new(session))
    }

    fn last_request(mock: &MockTransport) -> ApiRequest {
        mock.requests().pop().unwrap()
    }

    #[tokio::test]
    async fn test_text_query_flow() {
        let mock = Arc::new(MockTransport::new(backend));
        let dispatcher = dispatcher(mock.clone());

        let request = QueryRequest::text("gold necklace").with_limit(5).unwrap();
        let response = dispatcher.dispatch(request).await.unwrap();

        assert_eq!(
            mock.paths(),
            vec!["/auth/login", "/chat/sessions", "/chat/query"]
        );
        assert_eq!(response.assistant_text, "Found these");
        assert_eq!(response.products.len(), 1);

        let sent = last_request(&mock);
        assert_eq!(sent.bearer.as_deref(), Some("tok-1"));
        assert_eq!(
            sent.body,
            RequestBody::Json(json!({
                "session_id": "sess-1",
                "query": "gold necklace",
                "limit": 5,
            }))
        );
    }

    #[tokio::test]
    async fn test_default_category_applies() {
        let mock = Arc::new(MockTransport::new(backend));
        let dispatcher = dispatcher(mock.clone()).with_default_category(Some("rings".into()));

        dispatcher.dispatch(QueryRequest::text("gold")).await.unwrap();
        match last_request(&mock).body {
            RequestBody::Json(body) => assert_eq!(body["category"], "rings"),
            other => panic!("unexpected body {:?}", other),
        }

        dispatcher
            .dispatch(QueryRequest::text("gold").with_category("earrings"))
            .await
            .unwrap();
        match last_request(&mock).body {
            RequestBody::Json(body) => assert_eq!(body["category"], "earrings"),
            other => panic!("unexpected body {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_blank_text_query_rejected_before_sending() {
        let mock = Arc::new(MockTransport::new(backend));
        let dispatcher = dispatcher(mock.clone());

        let err = dispatcher.dispatch(QueryRequest::text("  ")).await.unwrap_err();
        assert!(matches!(err, ClientError::Query(_)));
        assert_eq!(mock.count("/chat/query"), 0);
    }

    #[tokio::test]
    async fn test_image_query_is_multipart() {
        let mock = Arc::new(MockTransport::new(backend));
        let dispatcher = dispatcher(mock.clone());

        let image = ImageInput::DataUri("data:image/png;base64,QUJD".into());
        dispatcher.dispatch(QueryRequest::image(image)).await.unwrap();

        let sent = last_request(&mock);
        assert_eq!(sent.path, "/chat/image-query");
        assert_eq!(
            sent.form_field("session_id").and_then(FormField::as_text),
            Some("sess-1")
        );
        assert!(sent.form_field("query").is_none());
        match &sent.form_field("image").unwrap().value {
            FormValue::File {
                bytes, mime_type, ..
            } => {
                assert_eq!(bytes, b"ABC");
                assert_eq!(mime_type, "image/png");
            }
            other => panic!("expected file, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_text_image_requires_both() {
        let mock = Arc::new(MockTransport::new(backend));
        let dispatcher = dispatcher(mock.clone());

        let request = QueryRequest::text_image("like this but silver", ImageInput::Base64("QUJD".into()))
            .with_category("rings");
        dispatcher.dispatch(request).await.unwrap();

        let sent = last_request(&mock);
        assert_eq!(
            sent.form_field("query").and_then(FormField::as_text),
            Some("like this but silver")
        );
        assert_eq!(
            sent.form_field("category").and_then(FormField::as_text),
            Some("rings")
        );

        let err = dispatcher
            .dispatch(QueryRequest::text_image(" ", ImageInput::Base64("QUJD".into())))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Query(_)));
    }

    #[tokio::test]
    async fn test_bad_image_is_query_error() {
        let mock = Arc::new(MockTransport::new(backend));
        let dispatcher = dispatcher(mock.clone());

        let err = dispatcher
            .dispatch(QueryRequest::image(ImageInput::Base64("%%%".into())))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Query(_)));
        assert_eq!(mock.count("/chat/image-query"), 0);
    }

    #[tokio::test]
    async fn test_similarity_uses_search_endpoint() {
        let mock = Arc::new(MockTransport::new(backend));
        let dispatcher = dispatcher(mock.clone());

        let request = QueryRequest::similarity("vintage pearl earrings")
            .with_limit(3)
            .unwrap();
        let response = dispatcher.dispatch(request).await.unwrap();

        let sent = last_request(&mock);
        assert_eq!(sent.path, "/products/search");
        assert_eq!(
            sent.form_field("limit").and_then(FormField::as_text),
            Some("3")
        );
        assert!(sent.form_field("image").is_none());
        assert_eq!(response.products[0].score, Some(0.8));
    }

    #[tokio::test]
    async fn test_similarity_needs_text_or_image() {
        let mock = Arc::new(MockTransport::new(backend));
        let dispatcher = dispatcher(mock);

        let err = dispatcher
            .dispatch(QueryRequest::similarity(""))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Query(_)));
    }

    #[tokio::test]
    async fn test_backend_detail_surfaces() {
        let mock = Arc::new(MockTransport::new(|req| match req.path.as_str() {
            "/chat/query" => Ok(ApiResponse::new(
                400,
                json!({"detail": "Query cannot be empty"}),
            )),
            _ => backend(req),
        }));
        let dispatcher = dispatcher(mock);

        let err = dispatcher
            .dispatch(QueryRequest::text("ring"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Query(ref m) if m == "Query cannot be empty"));
    }

    #[tokio::test]
    async fn test_401_expires_session() {
        let mock = Arc::new(MockTransport::new(|req| match req.path.as_str() {
            "/chat/query" => Ok(ApiResponse::new(401, json!({"detail": "Token expired"}))),
            _ => backend(req),
        }));
        let dispatcher = dispatcher(mock);

        let err = dispatcher
            .dispatch(QueryRequest::text("ring"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::AuthExpired));

        let session = dispatcher.session();
        assert_eq!(session.state(), AuthState::Expired);
        assert!(session.credentials().is_none());
        assert!(session.session_id().is_none());
    }

    #[tokio::test]
    async fn test_network_error_passes_through() {
        let mock = Arc::new(MockTransport::new(|req| match req.path.as_str() {
            "/chat/query" => Err(ClientError::Network("connection reset".into())),
            _ => backend(req),
        }));
        let dispatcher = dispatcher(mock);

        let err = dispatcher
            .dispatch(QueryRequest::text("ring"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Network(_)));
    }
}
