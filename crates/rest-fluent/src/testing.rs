//! Scripted transports for tests.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::transport::{AsyncTransport, HttpRequest, HttpResponse, Transport, TransportError};

type Scripted = Result<HttpResponse, TransportError>;

/// A transport replaying queued outcomes in order and recording every
/// request it receives. Serves both concurrency modes.
#[derive(Debug, Default)]
pub struct MockTransport {
    responses: Mutex<Vec<Scripted>>,
    request_log: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    /// Create a transport with the given outcomes.
    pub fn new(responses: Vec<Scripted>) -> Self {
        Self {
            responses: Mutex::new(responses),
            request_log: Mutex::new(Vec::new()),
        }
    }

    /// Queue one more outcome.
    pub fn push(&self, response: Scripted) {
        self.responses.lock().unwrap().push(response);
    }

    /// Every request sent so far.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.request_log.lock().unwrap().clone()
    }

    fn next(&self, request: &HttpRequest) -> Scripted {
        self.request_log.lock().unwrap().push(request.clone());

        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Err(TransportError::other(
                "MockTransport: no more responses available",
            ));
        }
        responses.remove(0)
    }
}

impl Transport for MockTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.next(request)
    }
}

#[async_trait]
impl AsyncTransport for MockTransport {
    async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.next(request)
    }
}

/// A JSON page response with a `Content-Range` header.
pub fn page(items: &[serde_json::Value], first: usize, last: usize, count: usize) -> HttpResponse {
    HttpResponse::json(200, &serde_json::Value::Array(items.to_vec()))
        .with_header("Content-Range", format!("items {}-{}/{}", first, last, count))
}
