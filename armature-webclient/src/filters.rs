//! Built-in exchange filters.

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use http::header::{AUTHORIZATION, HeaderName, HeaderValue};
use http::StatusCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

use crate::body::BodyStream;
use crate::filter::{ExchangeFilter, Next};
use crate::{ClientRequest, ClientResponse, Result, WebClientError};

/// Logs requests and responses with `tracing`.
#[derive(Debug, Clone, Default)]
pub struct LoggingFilter {
    log_headers: bool,
}

impl LoggingFilter {
    /// Create a new logging filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable logging of headers.
    pub fn with_headers(mut self) -> Self {
        self.log_headers = true;
        self
    }
}

#[async_trait]
impl ExchangeFilter for LoggingFilter {
    async fn filter(&self, request: ClientRequest, next: Next) -> Result<ClientResponse> {
        let id = request.id();
        debug!(
            exchange = %id,
            method = %request.method(),
            url = %request.url(),
            "HTTP request"
        );
        if self.log_headers {
            for (name, value) in request.headers() {
                trace!(exchange = %id, header = %name, value = ?value, "Request header");
            }
        }

        let started = std::time::Instant::now();
        let result = next.run(request).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(response) => {
                let status = response.status();
                if status.is_client_error() || status.is_server_error() {
                    warn!(exchange = %id, status = %status, elapsed_ms, "HTTP error response");
                } else {
                    debug!(exchange = %id, status = %status, elapsed_ms, "HTTP response");
                }
                if self.log_headers {
                    for (name, value) in response.headers() {
                        trace!(exchange = %id, header = %name, value = ?value, "Response header");
                    }
                }
            }
            Err(e) => debug!(exchange = %id, error = %e, elapsed_ms, "HTTP exchange failed"),
        }
        result
    }
}

#[derive(Debug, Clone)]
enum AuthType {
    Bearer(String),
    Basic { username: String, password: String },
    ApiKey { header: String, key: String },
}

/// Adds authentication headers to every request.
#[derive(Debug, Clone)]
pub struct AuthFilter {
    auth_type: AuthType,
}

impl AuthFilter {
    /// Create a bearer token filter.
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            auth_type: AuthType::Bearer(token.into()),
        }
    }

    /// Create a basic auth filter.
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            auth_type: AuthType::Basic {
                username: username.into(),
                password: password.into(),
            },
        }
    }

    /// Create an API key filter.
    pub fn api_key(header: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            auth_type: AuthType::ApiKey {
                header: header.into(),
                key: key.into(),
            },
        }
    }

    fn header(&self) -> Result<(HeaderName, HeaderValue)> {
        let invalid = |e: &dyn std::fmt::Display| {
            WebClientError::InvalidRequestState(format!("Invalid auth header: {}", e))
        };
        match &self.auth_type {
            AuthType::Bearer(token) => {
                let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|e| invalid(&e))?;
                value.set_sensitive(true);
                Ok((AUTHORIZATION, value))
            }
            AuthType::Basic { username, password } => {
                use base64::Engine;
                let credentials = base64::engine::general_purpose::STANDARD
                    .encode(format!("{}:{}", username, password));
                let mut value = HeaderValue::from_str(&format!("Basic {}", credentials))
                    .map_err(|e| invalid(&e))?;
                value.set_sensitive(true);
                Ok((AUTHORIZATION, value))
            }
            AuthType::ApiKey { header, key } => {
                let name = HeaderName::from_bytes(header.as_bytes()).map_err(|e| invalid(&e))?;
                let mut value = HeaderValue::from_str(key).map_err(|e| invalid(&e))?;
                value.set_sensitive(true);
                Ok((name, value))
            }
        }
    }
}

#[async_trait]
impl ExchangeFilter for AuthFilter {
    async fn filter(&self, request: ClientRequest, next: Next) -> Result<ClientResponse> {
        let (name, value) = self.header()?;
        next.run(request.mutate().header(name, value).build()).await
    }
}

/// Fails the exchange if the response head does not arrive in time.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutFilter {
    timeout: Duration,
}

impl TimeoutFilter {
    /// Create a new timeout filter.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl ExchangeFilter for TimeoutFilter {
    async fn filter(&self, request: ClientRequest, next: Next) -> Result<ClientResponse> {
        match tokio::time::timeout(self.timeout, next.run(request)).await {
            Ok(result) => result,
            Err(_) => Err(WebClientError::Timeout(self.timeout)),
        }
    }
}

type ErrorFn = Arc<dyn Fn(&ClientResponse) -> WebClientError + Send + Sync>;

/// Turns responses with matching statuses into errors, releasing the body.
#[derive(Clone)]
pub struct StatusErrorFilter {
    predicate: Arc<dyn Fn(StatusCode) -> bool + Send + Sync>,
    error: ErrorFn,
}

impl StatusErrorFilter {
    /// Create a filter mapping matching responses to errors.
    pub fn new<P, E>(predicate: P, error: E) -> Self
    where
        P: Fn(StatusCode) -> bool + Send + Sync + 'static,
        E: Fn(&ClientResponse) -> WebClientError + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(predicate),
            error: Arc::new(error),
        }
    }
}

impl std::fmt::Debug for StatusErrorFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StatusErrorFilter")
    }
}

#[async_trait]
impl ExchangeFilter for StatusErrorFilter {
    async fn filter(&self, request: ClientRequest, next: Next) -> Result<ClientResponse> {
        let response = next.run(request).await?;
        if (self.predicate)(response.status()) {
            let error = (self.error)(&response);
            response.release();
            return Err(error);
        }
        Ok(response)
    }
}

/// Truncates response bodies after a number of bytes.
#[derive(Debug, Clone, Copy)]
pub struct LimitResponseSizeFilter {
    max_bytes: usize,
}

impl LimitResponseSizeFilter {
    /// Create a new size limit filter.
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }
}

#[async_trait]
impl ExchangeFilter for LimitResponseSizeFilter {
    async fn filter(&self, request: ClientRequest, next: Next) -> Result<ClientResponse> {
        let response = next.run(request).await?;
        let max_bytes = self.max_bytes;
        Ok(response
            .mutate()
            .map_body(|body| truncate(body, max_bytes))
            .build())
    }
}

/// Yield at most `limit` bytes, then drop the source body.
fn truncate(body: BodyStream, limit: usize) -> BodyStream {
    stream::unfold(Some((body, limit)), |state| async move {
        let (mut body, remaining) = state?;
        if remaining == 0 {
            return None;
        }
        match body.next().await? {
            Ok(chunk) if chunk.len() >= remaining => {
                Some((Ok(chunk.slice(..remaining)), None))
            }
            Ok(chunk) => {
                let remaining = remaining - chunk.len();
                Some((Ok(chunk), Some((body, remaining))))
            }
            Err(e) => Some((Err(e), None)),
        }
    })
    .boxed()
}
