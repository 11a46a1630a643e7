//! WebClient error types.

use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::codec::PayloadKind;

/// Result type for WebClient operations.
pub type Result<T> = std::result::Result<T, WebClientError>;

/// WebClient errors.
#[derive(Debug, Error)]
pub enum WebClientError {
    /// The request could not be built from the supplied parts.
    #[error("Invalid request state: {0}")]
    InvalidRequestState(String),

    /// The target URI could not be parsed or resolved.
    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    /// No registered codec handles the content type for the payload kind.
    #[error("Content type '{content_type}' not supported for {kind} payloads")]
    UnsupportedMediaType {
        /// Requested or received content type.
        content_type: String,
        /// Payload kind that was being encoded or decoded.
        kind: PayloadKind,
    },

    /// Transport failure reported by the connector.
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// 4xx or 5xx response without a matching status handler.
    #[error(transparent)]
    ResponseStatus(Box<ResponseStatusError>),

    /// Encoding or decoding failure.
    #[error("Codec error: {0}")]
    Codec(String),

    /// A buffered body or stream frame exceeded the in-memory limit.
    #[error("Exceeded limit on max bytes to buffer: {limit}")]
    DataBufferLimit {
        /// Configured limit in bytes.
        limit: usize,
    },

    /// The exchange did not complete in time.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Domain error produced by a status handler.
    #[error("{0}")]
    Custom(Box<dyn std::error::Error + Send + Sync>),
}

impl WebClientError {
    /// Wrap a domain error, typically from an `on_status` handler.
    pub fn custom<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Custom(Box::new(error))
    }

    /// Check if this is a transport error.
    pub fn is_connect(&self) -> bool {
        matches!(self, Self::Connect(_))
    }

    /// Check if this is a timeout, from a filter or from the transport.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Connect(e) => e.kind() == ConnectErrorKind::Timeout,
            _ => false,
        }
    }

    /// Get the HTTP status code if this is a response status error.
    pub fn status_code(&self) -> Option<StatusCode> {
        self.as_status_error().map(|e| e.status())
    }

    /// Get the response status error, if any.
    pub fn as_status_error(&self) -> Option<&ResponseStatusError> {
        match self {
            Self::ResponseStatus(e) => Some(e),
            _ => None,
        }
    }

    /// Downcast a custom error produced by a status handler.
    pub fn downcast_custom<E: std::error::Error + 'static>(&self) -> Option<&E> {
        match self {
            Self::Custom(e) => e.downcast_ref::<E>(),
            _ => None,
        }
    }
}

impl From<ResponseStatusError> for WebClientError {
    fn from(error: ResponseStatusError) -> Self {
        Self::ResponseStatus(Box::new(error))
    }
}

impl From<serde_json::Error> for WebClientError {
    fn from(error: serde_json::Error) -> Self {
        Self::Codec(error.to_string())
    }
}

impl From<reqwest::Error> for WebClientError {
    fn from(error: reqwest::Error) -> Self {
        Self::Connect(ConnectError::from(error))
    }
}

/// Classification of transport failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectErrorKind {
    /// The connection could not be established.
    Refused,
    /// Connecting or reading timed out.
    Timeout,
    /// TLS negotiation failed.
    Tls,
    /// The body stream failed after the response head arrived.
    Body,
    /// Any other transport failure.
    Other,
}

/// Transport failure surfaced as-is by the exchange engine.
#[derive(Debug, Error)]
#[error("Connection error ({kind:?}): {message}")]
pub struct ConnectError {
    kind: ConnectErrorKind,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ConnectError {
    /// Create a connect error.
    pub fn new(kind: ConnectErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Attach the underlying cause.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Failure classification.
    pub fn kind(&self) -> ConnectErrorKind {
        self.kind
    }

    /// Failure message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<reqwest::Error> for ConnectError {
    fn from(error: reqwest::Error) -> Self {
        let kind = if error.is_timeout() {
            ConnectErrorKind::Timeout
        } else if error.is_connect() {
            ConnectErrorKind::Refused
        } else if error.is_body() || error.is_decode() {
            ConnectErrorKind::Body
        } else {
            ConnectErrorKind::Other
        };
        Self::new(kind, error.to_string()).with_source(error)
    }
}

/// Error for a 4xx/5xx response, holding the buffered body.
#[derive(Debug, Clone)]
pub struct ResponseStatusError {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    method: Option<Method>,
    url: Option<url::Url>,
}

impl ResponseStatusError {
    /// Create a status error.
    pub fn new(
        status: StatusCode,
        headers: HeaderMap,
        body: Bytes,
        method: Option<Method>,
        url: Option<url::Url>,
    ) -> Self {
        Self {
            status,
            headers,
            body,
            method,
            url,
        }
    }

    /// Response status.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Buffered response body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Response body as UTF-8 text, lossy.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Parse the response body as JSON.
    pub fn body_json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Method of the originating request, if known.
    pub fn method(&self) -> Option<&Method> {
        self.method.as_ref()
    }

    /// URL of the originating request, if known.
    pub fn url(&self) -> Option<&url::Url> {
        self.url.as_ref()
    }
}

impl fmt::Display for ResponseStatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.status)?;
        if let (Some(method), Some(url)) = (&self.method, &self.url) {
            write!(f, " from {} {}", method, url)?;
        }
        Ok(())
    }
}

impl std::error::Error for ResponseStatusError {}
