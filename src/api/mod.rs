//! Network layer for the commerce backend
//!
//! All outbound calls are described as an `ApiRequest` and executed by a
//! `Transport`. The production transport is `HttpTransport` (reqwest); the
//! session manager always wraps it in `AuthExpiryInterceptor`, so no
//! component can reach the backend without 401 handling.

mod error;
mod http;
mod interceptor;

#[cfg(test)]
pub(crate) mod mock;

pub use error::ClientError;
pub use http::HttpTransport;
pub use interceptor::{AuthExpiryInterceptor, ExpiryHandler};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// HTTP verbs used by the backend API
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
        }
    }
}

/// A single multipart form field
#[derive(Debug, Clone, PartialEq)]
pub struct FormField {
    pub name: String,
    pub value: FormValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FormValue {
    Text(String),
    File {
        bytes: Vec<u8>,
        file_name: String,
        mime_type: String,
    },
}

impl FormField {
    pub fn text(name: &str, value: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            value: FormValue::Text(value.into()),
        }
    }

    pub fn file(name: &str, bytes: Vec<u8>, file_name: &str, mime_type: &str) -> Self {
        Self {
            name: name.to_string(),
            value: FormValue::File {
                bytes,
                file_name: file_name.to_string(),
                mime_type: mime_type.to_string(),
            },
        }
    }

    /// Text value of this field, if it is not a file
    pub fn as_text(&self) -> Option<&str> {
        match &self.value {
            FormValue::Text(s) => Some(s),
            FormValue::File { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(Value),
    Multipart(Vec<FormField>),
}

/// Transport-agnostic description of one backend call
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the API base, always starting with `/`
    pub path: String,
    /// Bearer token sent in the `Authorization` header
    pub bearer: Option<String>,
    pub body: RequestBody,
    /// Set for the login/signup exchanges: a 401 there means rejected
    /// credentials, not an expired session
    pub credential_exchange: bool,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            bearer: None,
            body: RequestBody::Empty,
            credential_exchange: false,
        }
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self {
            method: Method::Post,
            ..Self::get(path)
        }
    }

    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }

    pub fn with_json(mut self, body: Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    pub fn with_multipart(mut self, fields: Vec<FormField>) -> Self {
        self.body = RequestBody::Multipart(fields);
        self
    }

    pub fn as_credential_exchange(mut self) -> Self {
        self.credential_exchange = true;
        self
    }

    /// Multipart field lookup (test and logging helper)
    pub fn form_field(&self, name: &str) -> Option<&FormField> {
        match &self.body {
            RequestBody::Multipart(fields) => fields.iter().find(|f| f.name == name),
            _ => None,
        }
    }
}

/// Raw backend answer: status code plus the decoded body
///
/// Bodies that are not JSON are kept as a JSON string so error details
/// still reach the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    /// Build a response from raw body text
    pub fn from_text(status: u16, text: &str) -> Self {
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
        };
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Backend-provided error message, if any
    ///
    /// Understands `{"detail": "..."}`, FastAPI validation lists
    /// (`{"detail": [{"msg": "..."}]}`), `{"message": "..."}` and plain
    /// text bodies.
    pub fn error_detail(&self) -> Option<String> {
        match &self.body {
            Value::Object(map) => match map.get("detail") {
                Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
                Some(Value::Array(items)) => {
                    let msgs: Vec<&str> = items
                        .iter()
                        .filter_map(|item| item.get("msg").and_then(Value::as_str))
                        .collect();
                    (!msgs.is_empty()).then(|| msgs.join("; "))
                }
                _ => map
                    .get("message")
                    .and_then(Value::as_str)
                    .filter(|s| !s.trim().is_empty())
                    .map(str::to_string),
            },
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            _ => None,
        }
    }

    /// Backend detail, or a generic message naming the status code
    pub fn error_message(&self, what: &str) -> String {
        self.error_detail()
            .unwrap_or_else(|| format!("{} failed with HTTP {}", what, self.status))
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.body)
    }
}

/// Executes backend requests
///
/// Implementations only move bytes; status interpretation belongs to the
/// caller (and to `AuthExpiryInterceptor` for 401s).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, ClientError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_detail_string() {
        let resp = ApiResponse::new(400, json!({"detail": "Query cannot be empty"}));
        assert_eq!(resp.error_detail().as_deref(), Some("Query cannot be empty"));
    }

    #[test]
    fn test_error_detail_validation_list() {
        let resp = ApiResponse::new(
            422,
            json!({"detail": [{"msg": "field required"}, {"msg": "too short"}]}),
        );
        assert_eq!(
            resp.error_detail().as_deref(),
            Some("field required; too short")
        );
    }

    #[test]
    fn test_error_message_falls_back_to_status() {
        let resp = ApiResponse::new(502, Value::Null);
        assert_eq!(resp.error_detail(), None);
        assert_eq!(resp.error_message("Query"), "Query failed with HTTP 502");
    }

    #[test]
    fn test_from_text_keeps_non_json() {
        let resp = ApiResponse::from_text(500, "Internal Server Error");
        assert_eq!(resp.body, Value::String("Internal Server Error".into()));
        assert_eq!(resp.error_detail().as_deref(), Some("Internal Server Error"));

        let resp = ApiResponse::from_text(200, "");
        assert_eq!(resp.body, Value::Null);
    }

    #[test]
    fn test_form_field_lookup() {
        let req = ApiRequest::post("/chat/image-query").with_multipart(vec![
            FormField::text("session_id", "s-1"),
            FormField::file("image", vec![1, 2, 3], "upload.jpg", "image/jpeg"),
        ]);
        assert_eq!(
            req.form_field("session_id").and_then(FormField::as_text),
            Some("s-1")
        );
        assert!(req.form_field("image").unwrap().as_text().is_none());
        assert!(req.form_field("query").is_none());
    }
}
