//! Scripted in-memory transport for unit tests

use super::{ApiRequest, ApiResponse, ClientError, Transport};
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

type Responder = dyn Fn(&ApiRequest) -> Result<ApiResponse, ClientError> + Send + Sync;

/// Records every request and answers through a closure
pub(crate) struct MockTransport {
    responder: Box<Responder>,
    requests: Mutex<Vec<ApiRequest>>,
    delay: Duration,
}

impl MockTransport {
    pub(crate) fn new<F>(responder: F) -> Self
    where
        F: Fn(&ApiRequest) -> Result<ApiResponse, ClientError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
            delay: Duration::ZERO,
        }
    }

    /// Keep each request in flight for `delay` so concurrent callers overlap
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn paths(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.path).collect()
    }

    pub(crate) fn count(&self, path: &str) -> usize {
        self.requests().iter().filter(|r| r.path == path).count()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, ClientError> {
        self.requests.lock().unwrap().push(request.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (self.responder)(&request)
    }
}
