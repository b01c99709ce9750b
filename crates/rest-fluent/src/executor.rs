//! Request execution.
//!
//! Request shaping ([`build_request`]), response interpretation and the
//! retry decision are pure and shared by both concurrency modes. Only the
//! two `perform_*` loops differ, in how they wait for the transport and for
//! the retry backoff.

use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde_json::Value;
use url::form_urlencoded;

use crate::config::{Settings, AUTHORIZATION};
use crate::error::{ClientError, Error, ErrorBody, Result};
use crate::transport::{
    find_header, AsyncTransport, HttpRequest, HttpResponse, Method, Transport, TransportError,
};

/// Retry policy for transient failures (5xx responses, connection errors).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    /// Additional attempts after the first one.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each further retry.
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff: Duration) -> Self {
        Self {
            max_retries,
            backoff,
        }
    }

    /// Whether another attempt may follow the zero-based `attempt`.
    pub fn allows(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }

    /// Delay to wait after the zero-based `attempt` failed.
    pub fn delay(&self, attempt: u32) -> Duration {
        self.backoff
            .checked_mul(2u32.saturating_pow(attempt))
            .unwrap_or(self.backoff)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum RequestBody {
    Json(Value),
    Raw(Vec<u8>),
}

/// Per-call options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    headers: Vec<(String, String)>,
    params: Vec<(String, String)>,
    body: Option<RequestBody>,
    timeout: Option<Duration>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a request header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        upsert(&mut self.headers, name.into(), value.into());
        self
    }

    /// Add a query-string parameter, replacing any previous value.
    pub fn param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.set_param(name.into(), value.to_string());
        self
    }

    /// Send a JSON document as the body.
    pub fn json(mut self, payload: Value) -> Self {
        self.body = Some(RequestBody::Json(payload));
        self
    }

    /// Send raw bytes as the body.
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(RequestBody::Raw(body.into()));
        self
    }

    /// Override the configured timeout for this call.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Value of a query-string parameter.
    pub fn get_param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub(crate) fn set_param(&mut self, name: String, value: String) {
        match self.params.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.params.push((name, value)),
        }
    }
}

fn upsert(headers: &mut Vec<(String, String)>, name: String, value: String) {
    match headers
        .iter_mut()
        .find(|(k, _)| k.eq_ignore_ascii_case(&name))
    {
        Some(slot) => *slot = (name, value),
        None => headers.push((name, value)),
    }
}

/// Decoded response body.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// No content (HTTP 204).
    Empty,
    /// A JSON document.
    Json(Value),
    /// Any other content type, undecoded.
    Bytes(Vec<u8>),
}

impl Payload {
    pub fn is_empty(&self) -> bool {
        matches!(self, Payload::Empty)
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(value) => Some(value),
            _ => None,
        }
    }

    /// The JSON document; `Null` for an empty payload, `None` for bytes.
    pub fn into_json(self) -> Option<Value> {
        match self {
            Payload::Json(value) => Some(value),
            Payload::Empty => Some(Value::Null),
            Payload::Bytes(_) => None,
        }
    }

    /// Deserialize the JSON document into `T`.
    pub fn deserialize<T: DeserializeOwned>(self) -> Result<T> {
        match self.into_json() {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Err(Error::Decode("expected a JSON body".to_string())),
        }
    }
}

/// Outcome of a successful call.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub payload: Payload,
}

impl ApiResponse {
    /// Look up a header value (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// Shape the request for `method` on `path`.
///
/// Fails with [`Error::NotFound`] when validating against specs and the
/// operation is unknown. Header precedence, later wins: caller headers,
/// then authentication, then the configured defaults.
pub(crate) fn build_request(
    settings: &Settings,
    method: &Method,
    path: &str,
    options: &RequestOptions,
) -> Result<HttpRequest> {
    if let Some(specs) = &settings.validator {
        if !specs.exists(method, path) {
            return Err(Error::NotFound(format!(
                "The path `{}` does not exist.",
                path
            )));
        }
    }

    let mut headers = Vec::new();
    for (name, value) in &options.headers {
        upsert(&mut headers, name.clone(), value.clone());
    }
    for (name, value) in settings.auth_headers() {
        upsert(&mut headers, name.to_string(), value.to_string());
    }
    for (name, value) in &settings.default_headers {
        debug_assert!(!name.eq_ignore_ascii_case(AUTHORIZATION));
        upsert(&mut headers, name.clone(), value.clone());
    }

    let body = match &options.body {
        Some(RequestBody::Json(value)) => {
            if find_header(&headers, "Content-Type").is_none() {
                headers.push(("Content-Type".to_string(), "application/json".to_string()));
            }
            Some(serde_json::to_vec(value)?)
        }
        Some(RequestBody::Raw(bytes)) => Some(bytes.clone()),
        None => None,
    };

    Ok(HttpRequest {
        method: method.clone(),
        url: compose_url(&settings.endpoint, path, &options.params),
        headers,
        body,
        timeout: options.timeout.unwrap_or(settings.timeout),
    })
}

fn compose_url(endpoint: &str, path: &str, params: &[(String, String)]) -> String {
    let mut url = format!("{}/{}", endpoint, path.trim_start_matches('/'));
    if !params.is_empty() {
        let encoded = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params)
            .finish();
        url.push(if path.contains('?') { '&' } else { '?' });
        url.push_str(&encoded);
    }
    url
}

enum Outcome {
    Done(Result<ApiResponse>),
    Retry(Error),
}

fn settle(
    policy: &RetryPolicy,
    attempt: u32,
    result: std::result::Result<HttpResponse, TransportError>,
    expected: Option<u16>,
) -> Outcome {
    match result {
        Err(err) => {
            let retryable = err.is_transient() && policy.allows(attempt);
            let client_error = ClientError::from_transport(err);
            if retryable {
                Outcome::Retry(client_error.into())
            } else {
                Outcome::Done(Err(client_error.into()))
            }
        }
        Ok(response) if response.status >= 500 && policy.allows(attempt) => {
            Outcome::Retry(normalize_error(&response).into())
        }
        Ok(response) => Outcome::Done(interpret(response, expected)),
    }
}

/// Turn a response into a decoded payload or a normalized error.
pub(crate) fn interpret(response: HttpResponse, expected: Option<u16>) -> Result<ApiResponse> {
    if response.status >= 400 {
        return Err(normalize_error(&response).into());
    }
    if let Some(expected) = expected {
        if response.status != expected {
            return Err(ClientError::from_status(
                response.status,
                &format!("{} (expected {})", reason_phrase(&response), expected),
            )
            .into());
        }
    }

    let payload = if response.status == 204 {
        Payload::Empty
    } else if response
        .header("Content-Type")
        .is_some_and(|ct| ct.trim_start().starts_with("application/json"))
    {
        Payload::Json(serde_json::from_slice(&response.body).map_err(|e| {
            Error::Decode(format!("invalid JSON body: {}", e))
        })?)
    } else {
        Payload::Bytes(response.body)
    };

    Ok(ApiResponse {
        status: response.status,
        headers: response.headers,
        payload,
    })
}

/// Build a [`ClientError`] from an error response.
pub(crate) fn normalize_error(response: &HttpResponse) -> ClientError {
    match serde_json::from_slice::<ErrorBody>(&response.body) {
        Ok(body) => ClientError::from_api(response.status, body),
        Err(_) => ClientError::from_status(response.status, &reason_phrase(response)),
    }
}

/// The canonical reason for the status, else a line derived from the body.
fn reason_phrase(response: &HttpResponse) -> String {
    reqwest::StatusCode::from_u16(response.status)
        .ok()
        .and_then(|status| status.canonical_reason())
        .map(str::to_string)
        .unwrap_or_else(|| body_reason(&response.body))
}

fn body_reason(body: &[u8]) -> String {
    let text = match std::str::from_utf8(body) {
        Ok(text) => text.to_string(),
        // Latin-1 maps every byte to the code point of the same value.
        Err(_) => body.iter().map(|&b| b as char).collect(),
    };
    let line = text.lines().next().unwrap_or_default().trim();
    if line.is_empty() || line.chars().any(char::is_control) {
        "Unknown Error".to_string()
    } else {
        line.chars().take(80).collect()
    }
}

fn log_retry(request: &HttpRequest, policy: &RetryPolicy, attempt: u32, err: &Error) {
    tracing::warn!(
        method = %request.method,
        url = %request.url,
        attempt = attempt + 1,
        max_retries = policy.max_retries,
        backoff_ms = policy.delay(attempt).as_millis() as u64,
        error = %err,
        "Request failed, retrying"
    );
}

/// Perform a shaped request on the caller's thread.
pub(crate) fn perform_blocking(
    transport: &dyn Transport,
    policy: &RetryPolicy,
    request: &HttpRequest,
    expected: Option<u16>,
) -> Result<ApiResponse> {
    let mut attempt = 0;
    loop {
        tracing::debug!(method = %request.method, url = %request.url, attempt, "sending request");
        let started = Instant::now();
        let result = transport.send(request);
        log_result(&result, started);

        match settle(policy, attempt, result, expected) {
            Outcome::Done(result) => return result,
            Outcome::Retry(err) => {
                log_retry(request, policy, attempt, &err);
                let delay = policy.delay(attempt);
                if !delay.is_zero() {
                    std::thread::sleep(delay);
                }
                attempt += 1;
            }
        }
    }
}

/// Perform a shaped request, yielding while waiting.
pub(crate) async fn perform_async(
    transport: &dyn AsyncTransport,
    policy: &RetryPolicy,
    request: &HttpRequest,
    expected: Option<u16>,
) -> Result<ApiResponse> {
    let mut attempt = 0;
    loop {
        tracing::debug!(method = %request.method, url = %request.url, attempt, "sending request");
        let started = Instant::now();
        let result = transport.send(request).await;
        log_result(&result, started);

        match settle(policy, attempt, result, expected) {
            Outcome::Done(result) => return result,
            Outcome::Retry(err) => {
                log_retry(request, policy, attempt, &err);
                let delay = policy.delay(attempt);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                attempt += 1;
            }
        }
    }
}

fn log_result(result: &std::result::Result<HttpResponse, TransportError>, started: Instant) {
    let elapsed_ms = started.elapsed().as_millis() as u64;
    match result {
        Ok(response) => {
            tracing::debug!(status = response.status, elapsed_ms, "received response")
        }
        Err(err) => tracing::debug!(error = %err, elapsed_ms, "transport error"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientBuilder;
    use crate::specs::StaticSpecs;
    use crate::testing::MockTransport;
    use serde_json::json;

    fn settings(builder: ClientBuilder) -> Settings {
        builder.settings().unwrap()
    }

    fn plain() -> Settings {
        settings(
            ClientBuilder::new()
                .api_key("API_KEY")
                .endpoint("https://localhost"),
        )
    }

    #[test]
    fn test_build_request_headers_and_url() {
        let request = build_request(
            &plain(),
            &Method::GET,
            "resources",
            &RequestOptions::new()
                .header("X-Custom-Header", "value")
                .header("Authorization", "spoofed")
                .param("limit", 10),
        )
        .unwrap();

        assert_eq!(request.url, "https://localhost/resources?limit=10");
        assert_eq!(request.header("authorization"), Some("API_KEY"));
        assert!(request.header("User-Agent").unwrap().starts_with("rest-fluent/"));
        assert_eq!(request.header("X-Custom-Header"), Some("value"));
        assert_eq!(request.timeout, crate::config::DEFAULT_TIMEOUT);
        assert!(request.body.is_none());
    }

    #[test]
    fn test_default_headers_win_over_caller_headers() {
        let settings = settings(
            ClientBuilder::new()
                .api_key("API_KEY")
                .default_header("X-Custom-Header", "configured"),
        );
        let request = build_request(
            &settings,
            &Method::GET,
            "resources",
            &RequestOptions::new().header("x-custom-header", "caller"),
        )
        .unwrap();
        assert_eq!(request.header("X-Custom-Header"), Some("configured"));
        assert_eq!(
            request
                .headers
                .iter()
                .filter(|(k, _)| k.eq_ignore_ascii_case("x-custom-header"))
                .count(),
            1
        );
    }

    #[test]
    fn test_params_append_to_existing_query_string() {
        let request = build_request(
            &plain(),
            &Method::GET,
            "products?eq(status,published)",
            &RequestOptions::new().param("limit", 5).param("offset", 10),
        )
        .unwrap();
        assert_eq!(
            request.url,
            "https://localhost/products?eq(status,published)&limit=5&offset=10"
        );
    }

    #[test]
    fn test_json_body_and_timeout_override() {
        let request = build_request(
            &plain(),
            &Method::POST,
            "resources",
            &RequestOptions::new()
                .json(json!({"name": "x"}))
                .timeout(Duration::from_secs(500)),
        )
        .unwrap();
        assert_eq!(request.header("Content-Type"), Some("application/json"));
        let body: Value = serde_json::from_slice(request.body.as_deref().unwrap()).unwrap();
        assert_eq!(body, json!({"name": "x"}));
        assert_eq!(request.timeout, Duration::from_secs(500));
    }

    #[test]
    fn test_validation_against_specs() {
        let settings = settings(
            ClientBuilder::new()
                .api_key("API_KEY")
                .specs(StaticSpecs::new().collection("products")),
        );
        assert!(build_request(&settings, &Method::GET, "products", &RequestOptions::new()).is_ok());

        let err = build_request(&settings, &Method::GET, "resources", &RequestOptions::new())
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Not found: The path `resources` does not exist.");
    }

    #[test]
    fn test_interpret_decodes_by_content_type() {
        let response = interpret(HttpResponse::json(200, &json!([{"id": 1}])), None).unwrap();
        assert_eq!(response.payload, Payload::Json(json!([{"id": 1}])));

        let response = interpret(
            HttpResponse::new(200).with_body("This is a non json response."),
            None,
        )
        .unwrap();
        assert_eq!(
            response.payload,
            Payload::Bytes(b"This is a non json response.".to_vec())
        );

        let response = interpret(
            HttpResponse::new(200)
                .with_header("Content-Type", "application/json; charset=utf-8")
                .with_body("{\"a\":1}"),
            None,
        )
        .unwrap();
        assert_eq!(response.payload.as_json().unwrap()["a"], 1);
    }

    #[test]
    fn test_no_content_is_empty_regardless_of_body() {
        let response = HttpResponse::new(204)
            .with_header("Content-Type", "application/json")
            .with_body("error text");
        assert_eq!(interpret(response, None).unwrap().payload, Payload::Empty);
    }

    #[test]
    fn test_structured_error() {
        let response = HttpResponse::json(
            400,
            &json!({"error_code": "X", "errors": ["a", "b"]}),
        );
        let err = interpret(response, None).unwrap_err();
        let client_error = err.as_client_error().unwrap();
        assert_eq!(client_error.status_code, Some(400));
        assert_eq!(client_error.error_code.as_deref(), Some("X"));
        assert_eq!(client_error.errors, vec!["a", "b"]);
    }

    #[test]
    fn test_unrecognized_and_unparseable_errors() {
        let response = HttpResponse::json(400, &json!({"unrecognized": "code"}));
        let err = interpret(response, None).unwrap_err();
        assert_eq!(err.to_string(), "400 Bad Request");
        let client_error = err.as_client_error().unwrap();
        assert!(client_error.error_code.is_none());
        assert!(client_error.errors.is_empty());

        let response = HttpResponse::new(400).with_body("error text");
        let err = interpret(response, None).unwrap_err();
        assert_eq!(err.status_code(), Some(400));
        assert_eq!(err.to_string(), "400 Bad Request");
    }

    #[test]
    fn test_reason_from_body_for_unknown_status() {
        let utf8 = HttpResponse::new(599).with_body("Interñal Server Error".as_bytes());
        assert_eq!(normalize_error(&utf8).to_string(), "599 Interñal Server Error");

        // "Interñal" in ISO-8859-1: ñ is the single byte 0xF1.
        let latin1 = HttpResponse::new(599).with_body(b"Inter\xf1al Server Error".to_vec());
        assert_eq!(normalize_error(&latin1).to_string(), "599 Interñal Server Error");

        let garbage = HttpResponse::new(599).with_body(vec![0x00, 0x9f, 0x01]);
        assert_eq!(normalize_error(&garbage).to_string(), "599 Unknown Error");
    }

    #[test]
    fn test_expected_status_mismatch() {
        let err = interpret(HttpResponse::json(201, &json!({})), Some(200)).unwrap_err();
        assert_eq!(err.status_code(), Some(201));
        assert!(interpret(HttpResponse::json(200, &json!({})), Some(200)).is_ok());
    }

    #[test]
    fn test_retry_policy() {
        let policy = RetryPolicy::new(2, Duration::from_millis(100));
        assert!(policy.allows(0));
        assert!(policy.allows(1));
        assert!(!policy.allows(2));
        assert_eq!(policy.delay(0), Duration::from_millis(100));
        assert_eq!(policy.delay(2), Duration::from_millis(400));
        assert!(!RetryPolicy::default().allows(0));
    }

    #[test]
    fn test_perform_retries_transient_failures() {
        let transport = MockTransport::new(vec![
            Ok(HttpResponse::new(502)),
            Ok(HttpResponse::json(200, &json!([{"id": 1}]))),
        ]);
        let request = build_request(&plain(), &Method::GET, "resources", &RequestOptions::new())
            .unwrap();
        let response =
            perform_blocking(&transport, &RetryPolicy::new(2, Duration::ZERO), &request, None)
                .unwrap();
        assert_eq!(response.payload, Payload::Json(json!([{"id": 1}])));
        assert_eq!(transport.requests().len(), 2);
    }

    #[test]
    fn test_perform_gives_up_after_max_retries() {
        for status in [500, 501, 502] {
            let transport = MockTransport::new(vec![
                Ok(HttpResponse::new(status)),
                Ok(HttpResponse::new(status)),
                Ok(HttpResponse::new(status)),
                Ok(HttpResponse::json(200, &json!([]))),
            ]);
            let request =
                build_request(&plain(), &Method::GET, "resources", &RequestOptions::new())
                    .unwrap();
            let err = perform_blocking(
                &transport,
                &RetryPolicy::new(2, Duration::ZERO),
                &request,
                None,
            )
            .unwrap_err();
            assert_eq!(err.status_code(), Some(status));
            assert_eq!(transport.requests().len(), 3);
        }
    }

    #[test]
    fn test_client_errors_are_not_retried() {
        let transport = MockTransport::new(vec![
            Ok(HttpResponse::new(404)),
            Ok(HttpResponse::json(200, &json!([]))),
        ]);
        let request = build_request(&plain(), &Method::GET, "resources", &RequestOptions::new())
            .unwrap();
        let err = perform_blocking(&transport, &RetryPolicy::new(3, Duration::ZERO), &request, None)
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(transport.requests().len(), 1);
    }

    #[test]
    fn test_transport_failures() {
        let transport = MockTransport::new(vec![
            Err(TransportError::connect("refused")),
            Ok(HttpResponse::json(200, &json!({"ok": true}))),
        ]);
        let request = build_request(&plain(), &Method::GET, "resources", &RequestOptions::new())
            .unwrap();
        let policy = RetryPolicy::new(1, Duration::ZERO);
        assert!(perform_blocking(&transport, &policy, &request, None).is_ok());

        let transport = MockTransport::new(vec![Err(TransportError::other("generic"))]);
        let err = perform_blocking(&transport, &policy, &request, None).unwrap_err();
        let client_error = err.as_client_error().unwrap();
        assert_eq!(client_error.status_code, None);
        assert!(client_error.errors.is_empty());
        assert_eq!(
            client_error.transport.as_ref().map(|t| t.message.as_str()),
            Some("generic")
        );
        assert!(std::error::Error::source(client_error).is_some());
        assert_eq!(err.to_string(), "Unexpected error");
    }

    #[tokio::test]
    async fn test_perform_async_retries() {
        let transport = MockTransport::new(vec![
            Ok(HttpResponse::new(502)),
            Ok(HttpResponse::new(502)),
            Ok(HttpResponse::new(502)),
        ]);
        let request = build_request(&plain(), &Method::GET, "resources", &RequestOptions::new())
            .unwrap();
        let err = perform_async(
            &transport,
            &RetryPolicy::new(2, Duration::from_millis(1)),
            &request,
            None,
        )
        .await
        .unwrap_err();
        assert!(err.as_client_error().unwrap().is_server_error());
        assert_eq!(transport.requests().len(), 3);
    }
}
