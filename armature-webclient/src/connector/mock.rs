//! In-memory connector for tests.

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use super::{Connector, ConnectorResponse};
use crate::body::{self, BodyStream};
use crate::{ClientRequest, ConnectError, ExchangeId, Result};

type Responder = Arc<dyn Fn(&RecordedRequest) -> MockResponse + Send + Sync>;

/// Canned response returned by a [`MockConnector`].
pub struct MockResponse {
    outcome: std::result::Result<(StatusCode, HeaderMap, BodyStream), ConnectError>,
    delay: Option<Duration>,
}

impl MockResponse {
    /// Create an empty response with the given status.
    pub fn new(status: StatusCode) -> Self {
        Self {
            outcome: Ok((status, HeaderMap::new(), body::once(Bytes::new()))),
            delay: None,
        }
    }

    /// Create a response that fails the send with a transport error.
    pub fn error(error: ConnectError) -> Self {
        Self {
            outcome: Err(error),
            delay: None,
        }
    }

    /// Append a header.
    pub fn header(mut self, name: &'static str, value: &'static str) -> Self {
        if let Ok((_, headers, _)) = &mut self.outcome {
            headers.append(
                HeaderName::from_static(name),
                HeaderValue::from_static(value),
            );
        }
        self
    }

    /// Set a fixed body.
    pub fn body(mut self, bytes: impl Into<Bytes>) -> Self {
        if let Ok((_, _, body)) = &mut self.outcome {
            *body = body::once(bytes);
        }
        self
    }

    /// Set a JSON body and content type.
    pub fn json(self, value: &serde_json::Value) -> Self {
        self.header("content-type", "application/json")
            .body(value.to_string())
    }

    /// Stream the body from the given source, such as a channel receiver.
    pub fn stream<S>(mut self, stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes>> + Send + 'static,
    {
        if let Ok((_, _, body)) = &mut self.outcome {
            *body = Box::pin(stream);
        }
        self
    }

    /// Delay the response head.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl fmt::Debug for MockResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("MockResponse");
        match &self.outcome {
            Ok((status, headers, _)) => s.field("status", status).field("headers", headers),
            Err(e) => s.field("error", e),
        };
        s.field("delay", &self.delay).finish()
    }
}

/// A request seen by a [`MockConnector`], with its body collected.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// Exchange id.
    pub id: ExchangeId,
    /// HTTP method.
    pub method: Method,
    /// Request URL.
    pub url: Url,
    /// Request headers.
    pub headers: HeaderMap,
    /// Rendered `Cookie` header.
    pub cookies: Option<String>,
    /// Request body.
    pub body: Bytes,
}

impl RecordedRequest {
    /// Get a header value as a string.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Request body as UTF-8 text, lossy.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Default)]
struct MockState {
    queue: Mutex<VecDeque<MockResponse>>,
    responder: Mutex<Option<Responder>>,
    requests: Mutex<Vec<RecordedRequest>>,
    releases: Mutex<HashMap<ExchangeId, usize>>,
}

/// Connector answering from queued responses or a responder closure.
///
/// Queued responses are used first, then the responder, then an empty
/// `200 OK`. Clones share state, so a test can keep one clone for
/// assertions after handing another to a client.
#[derive(Clone, Default)]
pub struct MockConnector {
    state: Arc<MockState>,
}

impl MockConnector {
    /// Create a connector without responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for the next send.
    pub fn enqueue(&self, response: MockResponse) -> &Self {
        self.state.queue.lock().push_back(response);
        self
    }

    /// Answer every send without a queued response with a closure.
    pub fn respond_with<F>(&self, responder: F) -> &Self
    where
        F: Fn(&RecordedRequest) -> MockResponse + Send + Sync + 'static,
    {
        *self.state.responder.lock() = Some(Arc::new(responder));
        self
    }

    /// Requests seen so far.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().clone()
    }

    /// Number of sends that reached the connector.
    pub fn sent_count(&self) -> usize {
        self.state.requests.lock().len()
    }

    /// Number of releases for an exchange.
    pub fn release_count(&self, id: ExchangeId) -> usize {
        self.state.releases.lock().get(&id).copied().unwrap_or(0)
    }

    /// Number of releases across all exchanges.
    pub fn total_releases(&self) -> usize {
        self.state.releases.lock().values().sum()
    }
}

impl fmt::Debug for MockConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockConnector")
            .field("queued", &self.state.queue.lock().len())
            .field("sent", &self.sent_count())
            .finish()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn send(&self, request: ClientRequest) -> Result<ConnectorResponse> {
        let id = request.id();
        let method = request.method().clone();
        let url = request.url().clone();
        let headers = request.headers().clone();
        let cookies = request.cookie_header();
        let body = body::collect_limited(request.into_body().into_stream()?, None).await?;

        let recorded = RecordedRequest {
            id,
            method,
            url,
            headers,
            cookies,
            body,
        };
        self.state.requests.lock().push(recorded.clone());

        let queued = self.state.queue.lock().pop_front();
        let response = match queued {
            Some(response) => response,
            None => {
                let responder = self.state.responder.lock().clone();
                match responder {
                    Some(responder) => responder(&recorded),
                    None => MockResponse::new(StatusCode::OK),
                }
            }
        };

        if let Some(delay) = response.delay {
            tokio::time::sleep(delay).await;
        }
        let (status, headers, body) = response.outcome?;
        Ok(ConnectorResponse::new(status, headers, body))
    }

    fn release(&self, id: ExchangeId) {
        *self.state.releases.lock().entry(id).or_insert(0) += 1;
        tracing::trace!(exchange = %id, "Released mock exchange");
    }
}
