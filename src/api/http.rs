//! reqwest-backed transport

use super::{ApiRequest, ApiResponse, ClientError, FormValue, Method, RequestBody, Transport};
use async_trait::async_trait;

const USER_AGENT: &str = concat!(
    "shopchat/",
    env!("CARGO_PKG_VERSION"),
    env!("SHOPCHAT_VERSION_SUFFIX")
);

/// Sends `ApiRequest`s to `{base_url}{path}`
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Create a transport for an already validated base URL
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ClientError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn build_form(fields: Vec<super::FormField>) -> Result<reqwest::multipart::Form, ClientError> {
        let mut form = reqwest::multipart::Form::new();
        for field in fields {
            form = match field.value {
                FormValue::Text(text) => form.text(field.name, text),
                FormValue::File {
                    bytes,
                    file_name,
                    mime_type,
                } => {
                    let part = reqwest::multipart::Part::bytes(bytes)
                        .file_name(file_name)
                        .mime_str(&mime_type)
                        .map_err(|e| {
                            ClientError::Query(format!("Invalid MIME type '{}': {}", mime_type, e))
                        })?;
                    form.part(field.name, part)
                }
            };
        }
        Ok(form)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, ClientError> {
        let url = format!("{}{}", self.base_url, request.path);
        tracing::debug!("{} {}", request.method, url);

        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
        };

        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }

        builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(body) => builder.json(&body),
            RequestBody::Multipart(fields) => builder.multipart(Self::build_form(fields)?),
        };

        let response = builder.send().await.map_err(|e| {
            tracing::warn!("Request to {} failed: {}", url, e);
            ClientError::from_network_error(e)
        })?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(ClientError::from_network_error)?;

        tracing::debug!("{} {} -> {}", request.method, request.path, status);
        Ok(ApiResponse::from_text(status, &text))
    }
}
