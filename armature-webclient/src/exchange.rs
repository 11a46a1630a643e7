//! Exchange engine: the terminal connector call, release tracking, and
//! status handling for `retrieve`.

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::stream::{self, Stream, StreamExt};
use http::StatusCode;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::{debug, trace};

use crate::body::BodyStream;
use crate::codec::{CodecRegistry, FromPayload};
use crate::connector::Connector;
use crate::request::RequestBuilder;
use crate::response::{RequestInfo, ResponseEntity, ResponseStream};
use crate::{ClientRequest, ClientResponse, ExchangeId, Result};

/// Calls [`Connector::release`] when dropped.
struct Lease {
    connector: Arc<dyn Connector>,
    id: ExchangeId,
}

impl Drop for Lease {
    fn drop(&mut self) {
        trace!(exchange = %self.id, "Releasing exchange");
        self.connector.release(self.id);
    }
}

/// Response body that releases its exchange at end of stream, on error, or
/// when dropped, whichever comes first.
struct LeasedStream {
    inner: BodyStream,
    lease: Option<Lease>,
}

impl Stream for LeasedStream {
    type Item = Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.lease.is_none() {
            return Poll::Ready(None);
        }
        match this.inner.as_mut().poll_next(cx) {
            Poll::Ready(None) => {
                this.lease = None;
                Poll::Ready(None)
            }
            Poll::Ready(Some(Err(e))) => {
                this.lease = None;
                Poll::Ready(Some(Err(e)))
            }
            other => other,
        }
    }
}

/// Send a request through the connector, guarding the exchange so that it
/// is released exactly once.
pub(crate) async fn send(
    connector: Arc<dyn Connector>,
    codecs: Arc<CodecRegistry>,
    request: ClientRequest,
) -> Result<ClientResponse> {
    let info = RequestInfo::from(&request);
    let lease = Lease {
        connector: connector.clone(),
        id: info.id(),
    };

    debug!(
        exchange = %info.id(),
        method = %info.method(),
        url = %info.url(),
        "Sending request"
    );

    let response = match connector.send(request).await {
        Ok(response) => response,
        Err(e) => {
            debug!(exchange = %info.id(), error = %e, "Request failed");
            return Err(e);
        }
    };

    debug!(
        exchange = %info.id(),
        status = %response.status,
        "Received response"
    );

    let body = LeasedStream {
        inner: response.body,
        lease: Some(lease),
    };
    Ok(ClientResponse::new(
        response.status,
        response.headers,
        Box::pin(body),
        codecs,
        Some(info),
    ))
}

type StatusPredicate = Arc<dyn Fn(StatusCode) -> bool + Send + Sync>;
type StatusHandlerFn =
    Arc<dyn Fn(ClientResponse) -> BoxFuture<'static, Result<ClientResponse>> + Send + Sync>;

/// Handler for responses whose status matches a predicate.
///
/// The handler either fails the exchange with an error, or returns a
/// response that is then decoded as if it were successful.
#[derive(Clone)]
pub struct StatusHandler {
    predicate: StatusPredicate,
    handler: StatusHandlerFn,
}

impl StatusHandler {
    /// Create a status handler.
    pub fn new<P, F, Fut>(predicate: P, handler: F) -> Self
    where
        P: Fn(StatusCode) -> bool + Send + Sync + 'static,
        F: Fn(ClientResponse) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ClientResponse>> + Send + 'static,
    {
        Self {
            predicate: Arc::new(predicate),
            handler: Arc::new(
                move |response: ClientResponse| -> BoxFuture<'static, Result<ClientResponse>> {
                    Box::pin(handler(response))
                },
            ),
        }
    }

    /// Check if the handler applies to a status.
    pub fn matches(&self, status: StatusCode) -> bool {
        (self.predicate)(status)
    }

    /// Run the handler.
    pub fn handle(&self, response: ClientResponse) -> BoxFuture<'static, Result<ClientResponse>> {
        (self.handler)(response)
    }
}

impl std::fmt::Debug for StatusHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StatusHandler")
    }
}

/// Result of [`RequestBuilder::retrieve`]: declares how the response is
/// decoded. Nothing is sent until a terminal future or stream is polled.
pub struct ResponseSpec {
    request: RequestBuilder,
    handlers: Vec<StatusHandler>,
}

impl ResponseSpec {
    pub(crate) fn new(request: RequestBuilder) -> Self {
        Self {
            request,
            handlers: Vec::new(),
        }
    }

    /// Handle responses whose status matches the predicate.
    ///
    /// Handlers are consulted for non-2xx statuses in registration order,
    /// before the client's default handlers.
    pub fn on_status<P, F, Fut>(mut self, predicate: P, handler: F) -> Self
    where
        P: Fn(StatusCode) -> bool + Send + Sync + 'static,
        F: Fn(ClientResponse) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ClientResponse>> + Send + 'static,
    {
        self.handlers.push(StatusHandler::new(predicate, handler));
        self
    }

    /// Exchange and apply status handling, returning the response to decode.
    async fn into_response(self) -> Result<ClientResponse> {
        let request = self.request.build()?;
        let id = request.id();
        let config = self.request.config().clone();
        let response = config.exchange().exchange(request).await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        let handler = self
            .handlers
            .iter()
            .chain(config.status_handlers())
            .find(|h| h.matches(status))
            .cloned();
        if let Some(handler) = handler {
            debug!(exchange = %id, status = %status, "Applying status handler");
            return handler.handle(response).await;
        }

        if status.is_client_error() || status.is_server_error() {
            debug!(exchange = %id, status = %status, "Error status without handler");
            return Err(response.create_error().await?);
        }
        Ok(response)
    }

    /// Decode the body into a single value.
    pub async fn body<T: FromPayload>(self) -> Result<T> {
        self.into_response().await?.body::<T>().await
    }

    /// Decode the body as JSON.
    pub async fn json<T: DeserializeOwned + Send + 'static>(self) -> Result<T> {
        self.into_response().await?.json::<T>().await
    }

    /// Read the body as text.
    pub async fn text(self) -> Result<String> {
        self.into_response().await?.text().await
    }

    /// Read the body as bytes.
    pub async fn bytes(self) -> Result<Bytes> {
        self.into_response().await?.bytes().await
    }

    /// Decode the body into a lazy stream. The request is sent when the
    /// stream is first polled.
    pub fn body_stream<T: FromPayload>(self) -> ResponseStream<T> {
        stream::once(self.into_response())
            .flat_map(|response| match response {
                Ok(response) => response.body_stream::<T>(),
                Err(e) => stream::once(async move { Err(e) }).boxed(),
            })
            .boxed()
    }

    /// Decode the body into an entity with the status and headers.
    pub async fn to_entity<T: FromPayload>(self) -> Result<ResponseEntity<T>> {
        self.into_response().await?.to_entity::<T>().await
    }

    /// Release the body and return the status and headers.
    pub async fn to_bodiless_entity(self) -> Result<ResponseEntity<()>> {
        Ok(self.into_response().await?.to_bodiless_entity())
    }
}
