//! Client error types.

use std::fmt;

use thiserror::Error;

use crate::transport::TransportError;

/// Client error type.
#[derive(Debug, Error)]
pub enum Error {
    /// An argument had the wrong shape (e.g. a stepped slice).
    #[error("Invalid argument type: {0}")]
    InvalidType(String),

    /// An argument had an unusable value (blank name, negative index, ...).
    #[error("Invalid argument value: {0}")]
    InvalidValue(String),

    /// A query clause named an operator the query engine does not know.
    #[error("Unsupported operator: {0}")]
    UnsupportedOperator(String),

    /// A name or operation could not be resolved against the API specs.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The HTTP call failed.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// TOML configuration could not be parsed.
    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A response body did not have the shape the caller needed.
    #[error("Unexpected response body: {0}")]
    Decode(String),
}

impl Error {
    /// Check if this error was raised by argument validation.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            Error::InvalidType(_) | Error::InvalidValue(_) | Error::UnsupportedOperator(_)
        )
    }

    /// Check if this is a not-found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
            || matches!(self, Error::Client(e) if e.status_code == Some(404))
    }

    /// HTTP status code, when the error came from a response.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Client(e) => e.status_code,
            _ => None,
        }
    }

    /// The normalized HTTP error, if this is one.
    pub fn as_client_error(&self) -> Option<&ClientError> {
        match self {
            Error::Client(e) => Some(e),
            _ => None,
        }
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A normalized HTTP-layer failure.
///
/// Always constructible: when the server sent a structured error body the
/// code and messages are carried over, otherwise only the status code and a
/// summary line survive. `status_code` is `None` when no response was ever
/// received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientError {
    /// HTTP status code.
    pub status_code: Option<u16>,
    /// Error code declared by the server.
    pub error_code: Option<String>,
    /// Human-readable messages declared by the server, in order.
    pub errors: Vec<String>,
    /// Summary line rendered by `Display`.
    pub message: String,
    /// The failure below HTTP, when no response was received.
    pub transport: Option<TransportError>,
}

impl ClientError {
    /// An error for a call that never produced a response.
    pub fn unexpected() -> Self {
        Self {
            status_code: None,
            error_code: None,
            errors: Vec::new(),
            message: "Unexpected error".to_string(),
            transport: None,
        }
    }

    /// An error for a call the transport could not complete.
    pub fn from_transport(err: TransportError) -> Self {
        Self {
            transport: Some(err),
            ..Self::unexpected()
        }
    }

    /// An error carrying only a status code and its summary line.
    pub fn from_status(status: u16, reason: &str) -> Self {
        Self {
            status_code: Some(status),
            error_code: None,
            errors: Vec::new(),
            message: format!("{} {}", status, reason),
            transport: None,
        }
    }

    /// An error built from a structured server error body.
    pub fn from_api(status: u16, body: ErrorBody) -> Self {
        Self {
            status_code: Some(status),
            message: format!("{}: {}", body.error_code, body.errors.join(", ")),
            error_code: Some(body.error_code),
            errors: body.errors,
            transport: None,
        }
    }

    /// Check if the server reported a 5xx status.
    pub fn is_server_error(&self) -> bool {
        matches!(self.status_code, Some(status) if status >= 500)
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.transport
            .as_ref()
            .map(|err| err as &(dyn std::error::Error + 'static))
    }
}

/// Structured error body returned by the server.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct ErrorBody {
    pub error_code: String,
    pub errors: Vec<String>,
}
