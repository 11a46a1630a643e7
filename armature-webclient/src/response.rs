//! Client response handle.

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use serde::de::DeserializeOwned;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use url::Url;

use crate::body::{self, BodyStream};
use crate::codec::{CodecRegistry, FromPayload, Json};
use crate::{
    ClientRequest, ExchangeId, MediaType, ResponseCookie, ResponseStatusError, Result,
    WebClientError,
};

/// Lazy stream of decoded response values.
pub type ResponseStream<T> = Pin<Box<dyn Stream<Item = Result<T>> + Send>>;

/// The request a response belongs to.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    id: ExchangeId,
    method: Method,
    url: Url,
}

impl RequestInfo {
    /// Exchange id.
    pub fn id(&self) -> ExchangeId {
        self.id
    }

    /// HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Request URL.
    pub fn url(&self) -> &Url {
        &self.url
    }
}

impl From<&ClientRequest> for RequestInfo {
    fn from(request: &ClientRequest) -> Self {
        Self {
            id: request.id(),
            method: request.method().clone(),
            url: request.url().clone(),
        }
    }
}

/// Response of an exchange with an unread body.
///
/// Every consuming method takes `self`, so the body is read at most once.
/// The transport resource behind the body is released once the body has
/// been read to the end, or when the response or its body stream is dropped.
pub struct ClientResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: BodyStream,
    codecs: Arc<CodecRegistry>,
    request: Option<RequestInfo>,
}

impl ClientResponse {
    pub(crate) fn new(
        status: StatusCode,
        headers: HeaderMap,
        body: BodyStream,
        codecs: Arc<CodecRegistry>,
        request: Option<RequestInfo>,
    ) -> Self {
        Self {
            status,
            headers,
            body,
            codecs,
            request,
        }
    }

    /// Create a builder for a response produced without a connector, such
    /// as one returned by a short-circuiting filter.
    pub fn builder(status: StatusCode) -> ClientResponseBuilder {
        ClientResponseBuilder {
            status,
            headers: HeaderMap::new(),
            body: body::once(Bytes::new()),
            codecs: None,
            request: None,
        }
    }

    /// Get the status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Get the response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Get a specific header value.
    pub fn header(&self, name: impl AsRef<str>) -> Option<&str> {
        self.headers
            .get(name.as_ref())
            .and_then(|v| v.to_str().ok())
    }

    /// Get the content type, if present and valid.
    pub fn content_type(&self) -> Option<MediaType> {
        self.headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| MediaType::from_header(v).ok())
    }

    /// Get the content length if available.
    pub fn content_length(&self) -> Option<u64> {
        self.header("content-length").and_then(|v| v.parse().ok())
    }

    /// Cookies set by the server.
    pub fn cookies(&self) -> Vec<ResponseCookie> {
        ResponseCookie::from_headers(&self.headers)
    }

    /// The originating request, when the response came from a connector.
    pub fn request(&self) -> Option<&RequestInfo> {
        self.request.as_ref()
    }

    /// Codecs used to decode the body.
    pub fn codecs(&self) -> &Arc<CodecRegistry> {
        &self.codecs
    }

    fn media_type(&self) -> MediaType {
        self.content_type()
            .unwrap_or(MediaType::APPLICATION_OCTET_STREAM)
    }

    /// Decode the body into a single value.
    ///
    /// An empty body yields the type's empty value (`""` for text, `None`
    /// for options) where it has one. The decoder is selected before the
    /// body is buffered.
    pub async fn body<T: FromPayload>(self) -> Result<T> {
        let media = self.media_type();
        if let Err(unsupported) = self.codecs.decoder_for(&media, T::kind()) {
            let mut chunks = self.body;
            return match (chunks.next().await, T::from_empty()) {
                (None, Some(empty)) => Ok(empty),
                (Some(Err(e)), _) => Err(e),
                _ => Err(unsupported),
            };
        }
        let bytes = body::collect_limited(self.body, self.codecs.max_in_memory_size()).await?;
        if bytes.is_empty()
            && let Some(empty) = T::from_empty()
        {
            return Ok(empty);
        }
        let payload = self.codecs.decode_bytes(bytes, &media, T::kind())?;
        T::from_payload(payload)
    }

    /// Decode the body as JSON.
    pub async fn json<T: DeserializeOwned + Send + 'static>(self) -> Result<T> {
        self.body::<Json<T>>().await.map(Json::into_inner)
    }

    /// Read the body as text.
    pub async fn text(self) -> Result<String> {
        self.body::<String>().await
    }

    /// Read the body as bytes.
    pub async fn bytes(self) -> Result<Bytes> {
        self.body::<Bytes>().await
    }

    /// Decode the body into a lazy stream of values.
    ///
    /// Chunks are read only as the stream is polled. Codec selection
    /// failures surface as the first item.
    pub fn body_stream<T: FromPayload>(self) -> ResponseStream<T> {
        let media = self.media_type();
        match self.codecs.decode_stream(self.body, &media, T::kind()) {
            Ok(payloads) => payloads
                .map(|item| item.and_then(T::from_payload))
                .boxed(),
            Err(e) => stream::once(async move { Err(e) }).boxed(),
        }
    }

    /// Decode the body into an entity with the status and headers.
    pub async fn to_entity<T: FromPayload>(self) -> Result<ResponseEntity<T>> {
        let status = self.status;
        let headers = self.headers.clone();
        let body = self.body::<Option<T>>().await?;
        Ok(ResponseEntity {
            status,
            headers,
            body,
        })
    }

    /// Release the body and return the status and headers.
    pub fn to_bodiless_entity(self) -> ResponseEntity<()> {
        ResponseEntity {
            status: self.status,
            headers: self.headers,
            body: None,
        }
    }

    /// Discard the body, releasing the transport resource.
    pub fn release(self) {
        drop(self.body);
    }

    /// Buffer the body and create a [`ResponseStatusError`].
    ///
    /// Bodies over the in-memory limit are truncated to it. A failure while
    /// reading the body is returned instead of the status error.
    pub async fn create_error(self) -> Result<WebClientError> {
        let limit = self.codecs.max_in_memory_size();
        let body = body::collect_truncated(self.body, limit).await?;
        let (method, url) = match self.request {
            Some(info) => (Some(info.method), Some(info.url)),
            None => (None, None),
        };
        Ok(ResponseStatusError::new(self.status, self.headers, body, method, url).into())
    }

    /// Take the raw body stream.
    pub fn into_body(self) -> BodyStream {
        self.body
    }

    /// Start a builder pre-populated from this response, body included.
    pub fn mutate(self) -> ClientResponseBuilder {
        ClientResponseBuilder {
            status: self.status,
            headers: self.headers,
            body: self.body,
            codecs: Some(self.codecs),
            request: self.request,
        }
    }
}

impl fmt::Debug for ClientResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("request", &self.request)
            .finish_non_exhaustive()
    }
}

/// Builder for a [`ClientResponse`].
pub struct ClientResponseBuilder {
    status: StatusCode,
    headers: HeaderMap,
    body: BodyStream,
    codecs: Option<Arc<CodecRegistry>>,
    request: Option<RequestInfo>,
}

impl ClientResponseBuilder {
    /// Set the status.
    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Set a header, replacing existing values.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Manipulate the headers.
    pub fn headers(mut self, f: impl FnOnce(&mut HeaderMap)) -> Self {
        f(&mut self.headers);
        self
    }

    /// Replace the body with fixed bytes. The previous body is dropped.
    pub fn body(mut self, bytes: impl Into<Bytes>) -> Self {
        self.body = body::once(bytes);
        self
    }

    /// Replace the body stream. The previous body is dropped.
    pub fn body_stream(mut self, body: BodyStream) -> Self {
        self.body = body;
        self
    }

    /// Transform the body stream.
    pub fn map_body(mut self, f: impl FnOnce(BodyStream) -> BodyStream) -> Self {
        self.body = f(self.body);
        self
    }

    /// Set the codecs used to decode the body.
    pub fn codecs(mut self, codecs: Arc<CodecRegistry>) -> Self {
        self.codecs = Some(codecs);
        self
    }

    /// Set the originating request.
    pub fn request(mut self, request: &ClientRequest) -> Self {
        self.request = Some(RequestInfo::from(request));
        self
    }

    /// Build the response.
    pub fn build(self) -> ClientResponse {
        ClientResponse {
            status: self.status,
            headers: self.headers,
            body: self.body,
            codecs: self.codecs.unwrap_or_default(),
            request: self.request,
        }
    }
}

/// Status, headers, and decoded body of a response.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseEntity<T> {
    status: StatusCode,
    headers: HeaderMap,
    body: Option<T>,
}

impl<T> ResponseEntity<T> {
    /// Get the status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Get the headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Get the body, `None` when the response had none.
    pub fn body(&self) -> Option<&T> {
        self.body.as_ref()
    }

    /// Consume the entity and return the body.
    pub fn into_body(self) -> Option<T> {
        self.body
    }
}
