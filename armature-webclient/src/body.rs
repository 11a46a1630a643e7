//! Request and response body types.

use bytes::{Bytes, BytesMut};
use futures::stream::{self, Stream, StreamExt};
use parking_lot::Mutex;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

use crate::{Result, WebClientError};

/// Lazy byte stream used for request and response bodies.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Request body attached to a [`ClientRequest`](crate::ClientRequest).
#[derive(Clone, Default)]
pub enum Body {
    /// No body.
    #[default]
    Empty,
    /// Fully encoded body.
    Bytes(Bytes),
    /// Lazily produced body that can be taken once.
    Stream(OneShotStream),
}

impl Body {
    /// Create a streaming body.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes>> + Send + 'static,
    {
        Self::Stream(OneShotStream::new(Box::pin(stream)))
    }

    /// Check if there is no body.
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    /// Get the encoded bytes of a non-streaming body.
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Self::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Convert into a byte stream, taking a streaming body.
    pub fn into_stream(self) -> Result<BodyStream> {
        match self {
            Self::Empty => Ok(Box::pin(stream::empty())),
            Self::Bytes(bytes) => Ok(Box::pin(stream::once(async move { Ok(bytes) }))),
            Self::Stream(shared) => shared.take(),
        }
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Body::Empty"),
            Self::Bytes(bytes) => write!(f, "Body::Bytes({} bytes)", bytes.len()),
            Self::Stream(_) => f.write_str("Body::Stream"),
        }
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

/// A stream that may be shared by clones of a request but subscribed only once.
#[derive(Clone)]
pub struct OneShotStream {
    inner: Arc<Mutex<Option<BodyStream>>>,
}

impl OneShotStream {
    /// Wrap a body stream.
    pub fn new(stream: BodyStream) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(stream))),
        }
    }

    /// Take the stream, failing if another holder already did.
    pub fn take(&self) -> Result<BodyStream> {
        self.inner.lock().take().ok_or_else(|| {
            WebClientError::InvalidRequestState(
                "request body stream has already been consumed".to_string(),
            )
        })
    }
}

/// Buffer a body stream, failing once more than `limit` bytes arrive.
pub async fn collect_limited(mut body: BodyStream, limit: Option<usize>) -> Result<Bytes> {
    let mut buffer = BytesMut::new();
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        if let Some(limit) = limit
            && buffer.len() + chunk.len() > limit
        {
            return Err(WebClientError::DataBufferLimit { limit });
        }
        buffer.extend_from_slice(&chunk);
    }
    Ok(buffer.freeze())
}

/// Buffer at most `limit` bytes of a body, dropping the rest unread.
/// Read failures are returned as-is.
pub(crate) async fn collect_truncated(mut body: BodyStream, limit: Option<usize>) -> Result<Bytes> {
    let mut buffer = BytesMut::new();
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        match limit {
            Some(limit) if buffer.len() + chunk.len() >= limit => {
                buffer.extend_from_slice(&chunk[..limit - buffer.len()]);
                break;
            }
            _ => buffer.extend_from_slice(&chunk),
        }
    }
    Ok(buffer.freeze())
}

/// Create a body stream from a single chunk.
pub fn once(bytes: impl Into<Bytes>) -> BodyStream {
    let bytes = bytes.into();
    if bytes.is_empty() {
        Box::pin(stream::empty())
    } else {
        Box::pin(stream::once(async move { Ok(bytes) }))
    }
}
