//! Mock HTTP transport for tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{HttpRequest, HttpResponse, HttpTransport, TransportError};

#[derive(Default)]
struct Inner {
    script: VecDeque<Result<HttpResponse, TransportError>>,
    requests: Vec<HttpRequest>,
}

/// Scripted transport: queue responses and failures, record every request.
///
/// An empty script answers with an empty `200 OK`, which is what a
/// receiver that was not asked for an MDN sends back.
#[derive(Default, Clone)]
pub struct MockTransport {
    inner: Arc<Mutex<Inner>>,
}

impl MockTransport {
    /// Create a mock transport with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for the next unanswered request.
    pub fn queue_response(&self, response: HttpResponse) {
        self.inner.lock().unwrap().script.push_back(Ok(response));
    }

    /// Queue a transport failure for the next unanswered request.
    pub fn queue_failure(&self, error: TransportError) {
        self.inner.lock().unwrap().script.push_back(Err(error));
    }

    /// All requests executed so far.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.inner.lock().unwrap().requests.clone()
    }

    /// Number of requests executed so far.
    pub fn request_count(&self) -> usize {
        self.inner.lock().unwrap().requests.len()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut inner = self.inner.lock().unwrap();
        inner.requests.push(request);
        inner.script.pop_front().unwrap_or_else(|| Ok(HttpResponse::ok()))
    }
}
