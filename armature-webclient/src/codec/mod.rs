//! Codec registry converting between payloads and body byte streams.
//!
//! Values cross the codec boundary as a [`Payload`]. Typed values enter
//! through [`IntoPayload`] and leave through [`FromPayload`]; the
//! [`PayloadKind`] of the target type takes part in codec selection
//! alongside the content type.

mod form;
mod json;
mod sse;
mod text;

pub use form::FormCodec;
pub use json::JsonCodec;
pub use sse::{ServerSentEvent, SseCodec};
pub use text::{BytesCodec, StringCodec};

use bytes::{Bytes, BytesMut};
use futures::stream::{self, Stream, StreamExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

use crate::body::{self, BodyStream};
use crate::{MediaType, Result, WebClientError};

/// Default limit on bytes buffered in memory for a single value or frame.
pub const DEFAULT_MAX_IN_MEMORY_SIZE: usize = 256 * 1024;

/// Lazy stream of decoded payloads.
pub type PayloadStream = Pin<Box<dyn Stream<Item = Result<Payload>> + Send>>;

/// Shape of an in-memory value, used as the target type during codec selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    /// Raw bytes.
    Bytes,
    /// UTF-8 text.
    Text,
    /// Structured data (objects, arrays, scalars).
    Structured,
    /// Server-sent event.
    Event,
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bytes => "bytes",
            Self::Text => "text",
            Self::Structured => "structured",
            Self::Event => "event",
        };
        f.write_str(name)
    }
}

/// An in-memory value on its way to or from a codec.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Raw bytes.
    Bytes(Bytes),
    /// UTF-8 text.
    Text(String),
    /// Structured data.
    Structured(serde_json::Value),
    /// Server-sent event.
    Event(ServerSentEvent),
}

impl Payload {
    /// Kind of this payload.
    pub fn kind(&self) -> PayloadKind {
        match self {
            Self::Bytes(_) => PayloadKind::Bytes,
            Self::Text(_) => PayloadKind::Text,
            Self::Structured(_) => PayloadKind::Structured,
            Self::Event(_) => PayloadKind::Event,
        }
    }
}

fn mismatch(expected: PayloadKind, payload: &Payload) -> WebClientError {
    WebClientError::Codec(format!(
        "expected {} payload, codec produced {}",
        expected,
        payload.kind()
    ))
}

/// Values that can be written as a request body.
pub trait IntoPayload: Send + 'static {
    /// Kind of payload this type produces.
    fn kind() -> PayloadKind;

    /// Convert into a payload.
    fn into_payload(self) -> Result<Payload>;
}

/// Values that can be decoded from a response body.
pub trait FromPayload: Sized + Send + 'static {
    /// Kind of payload this type is decoded from.
    fn kind() -> PayloadKind;

    /// Convert from a decoded payload.
    fn from_payload(payload: Payload) -> Result<Self>;

    /// Value to produce for an empty body instead of decoding, if any.
    fn from_empty() -> Option<Self> {
        None
    }
}

/// JSON-serialized value marker, for typed request and response bodies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Json<T>(pub T);

impl<T> Json<T> {
    /// Unwrap the inner value.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl IntoPayload for Bytes {
    fn kind() -> PayloadKind {
        PayloadKind::Bytes
    }

    fn into_payload(self) -> Result<Payload> {
        Ok(Payload::Bytes(self))
    }
}

impl IntoPayload for Vec<u8> {
    fn kind() -> PayloadKind {
        PayloadKind::Bytes
    }

    fn into_payload(self) -> Result<Payload> {
        Ok(Payload::Bytes(Bytes::from(self)))
    }
}

impl IntoPayload for String {
    fn kind() -> PayloadKind {
        PayloadKind::Text
    }

    fn into_payload(self) -> Result<Payload> {
        Ok(Payload::Text(self))
    }
}

impl IntoPayload for &'static str {
    fn kind() -> PayloadKind {
        PayloadKind::Text
    }

    fn into_payload(self) -> Result<Payload> {
        Ok(Payload::Text(self.to_string()))
    }
}

impl IntoPayload for serde_json::Value {
    fn kind() -> PayloadKind {
        PayloadKind::Structured
    }

    fn into_payload(self) -> Result<Payload> {
        Ok(Payload::Structured(self))
    }
}

impl<T: Serialize + Send + 'static> IntoPayload for Json<T> {
    fn kind() -> PayloadKind {
        PayloadKind::Structured
    }

    fn into_payload(self) -> Result<Payload> {
        Ok(Payload::Structured(serde_json::to_value(&self.0)?))
    }
}

impl IntoPayload for ServerSentEvent {
    fn kind() -> PayloadKind {
        PayloadKind::Event
    }

    fn into_payload(self) -> Result<Payload> {
        Ok(Payload::Event(self))
    }
}

impl FromPayload for Bytes {
    fn kind() -> PayloadKind {
        PayloadKind::Bytes
    }

    fn from_payload(payload: Payload) -> Result<Self> {
        match payload {
            Payload::Bytes(bytes) => Ok(bytes),
            other => Err(mismatch(PayloadKind::Bytes, &other)),
        }
    }

    fn from_empty() -> Option<Self> {
        Some(Bytes::new())
    }
}

impl FromPayload for String {
    fn kind() -> PayloadKind {
        PayloadKind::Text
    }

    fn from_payload(payload: Payload) -> Result<Self> {
        match payload {
            Payload::Text(text) => Ok(text),
            other => Err(mismatch(PayloadKind::Text, &other)),
        }
    }

    fn from_empty() -> Option<Self> {
        Some(String::new())
    }
}

impl FromPayload for serde_json::Value {
    fn kind() -> PayloadKind {
        PayloadKind::Structured
    }

    fn from_payload(payload: Payload) -> Result<Self> {
        match payload {
            Payload::Structured(value) => Ok(value),
            other => Err(mismatch(PayloadKind::Structured, &other)),
        }
    }
}

impl<T: DeserializeOwned + Send + 'static> FromPayload for Json<T> {
    fn kind() -> PayloadKind {
        PayloadKind::Structured
    }

    fn from_payload(payload: Payload) -> Result<Self> {
        match payload {
            Payload::Structured(value) => Ok(Json(serde_json::from_value(value)?)),
            other => Err(mismatch(PayloadKind::Structured, &other)),
        }
    }
}

impl FromPayload for ServerSentEvent {
    fn kind() -> PayloadKind {
        PayloadKind::Event
    }

    fn from_payload(payload: Payload) -> Result<Self> {
        match payload {
            Payload::Event(event) => Ok(event),
            other => Err(mismatch(PayloadKind::Event, &other)),
        }
    }
}

impl FromPayload for () {
    fn kind() -> PayloadKind {
        PayloadKind::Bytes
    }

    fn from_payload(_payload: Payload) -> Result<Self> {
        Ok(())
    }

    fn from_empty() -> Option<Self> {
        Some(())
    }
}

impl<T: FromPayload> FromPayload for Option<T> {
    fn kind() -> PayloadKind {
        T::kind()
    }

    fn from_payload(payload: Payload) -> Result<Self> {
        T::from_payload(payload).map(Some)
    }

    fn from_empty() -> Option<Self> {
        Some(None)
    }
}

/// Encoder and decoder between payloads and bytes for a set of media types.
pub trait Codec: Send + Sync + 'static {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Media types this codec reads and writes. Wildcards take part only
    /// in the fallback pass of codec selection.
    fn media_types(&self) -> &[MediaType];

    /// Check if the codec can decode into the payload kind.
    fn can_decode(&self, kind: PayloadKind) -> bool;

    /// Check if the codec can encode the payload kind.
    fn can_encode(&self, kind: PayloadKind) -> bool;

    /// Content type written when the request declares none.
    fn default_content_type(&self) -> MediaType {
        self.media_types()
            .iter()
            .find(|m| !m.is_wildcard())
            .cloned()
            .unwrap_or(MediaType::APPLICATION_OCTET_STREAM)
    }

    /// Decode a fully buffered body into a single payload.
    fn decode(&self, bytes: Bytes, media: &MediaType, kind: PayloadKind) -> Result<Payload>;

    /// Decode a body incrementally. `None` means the registry buffers the
    /// body and decodes it as a single value.
    fn decode_stream(
        &self,
        _body: BodyStream,
        _media: &MediaType,
        _kind: PayloadKind,
        _limit: Option<usize>,
    ) -> Option<PayloadStream> {
        None
    }

    /// Encode a single payload.
    fn encode(&self, payload: Payload, media: &MediaType) -> Result<Bytes>;

    /// Encode a stream of payloads. `None` means each item is encoded with
    /// [`Codec::encode`] and the results are concatenated.
    fn encode_stream(&self, _payloads: PayloadStream, _media: &MediaType) -> Option<BodyStream> {
        None
    }
}

/// Ordered set of codecs with the in-memory buffering limit.
#[derive(Clone)]
pub struct CodecRegistry {
    codecs: Vec<Arc<dyn Codec>>,
    max_in_memory_size: Option<usize>,
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("codecs", &self.codecs.iter().map(|c| c.name()).collect::<Vec<_>>())
            .field("max_in_memory_size", &self.max_in_memory_size)
            .finish()
    }
}

impl CodecRegistry {
    /// Create a registry without codecs.
    pub fn empty() -> Self {
        Self {
            codecs: Vec::new(),
            max_in_memory_size: Some(DEFAULT_MAX_IN_MEMORY_SIZE),
        }
    }

    /// Create a registry with the built-in codecs.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(BytesCodec);
        registry.register(JsonCodec);
        registry.register(FormCodec);
        registry.register(SseCodec);
        registry.register(StringCodec);
        registry
    }

    /// Append a codec; it is consulted after those already registered.
    pub fn register<C: Codec>(&mut self, codec: C) -> &mut Self {
        self.codecs.push(Arc::new(codec));
        self
    }

    /// Insert a codec ahead of all registered codecs.
    pub fn register_first<C: Codec>(&mut self, codec: C) -> &mut Self {
        self.codecs.insert(0, Arc::new(codec));
        self
    }

    /// Set the in-memory buffering limit, `None` for unlimited.
    pub fn set_max_in_memory_size(&mut self, limit: Option<usize>) -> &mut Self {
        self.max_in_memory_size = limit;
        self
    }

    /// In-memory buffering limit.
    pub fn max_in_memory_size(&self) -> Option<usize> {
        self.max_in_memory_size
    }

    /// Names of the registered codecs, in order.
    pub fn codec_names(&self) -> Vec<&'static str> {
        self.codecs.iter().map(|c| c.name()).collect()
    }

    fn select(
        &self,
        media: &MediaType,
        supports: impl Fn(&dyn Codec) -> bool,
    ) -> Option<Arc<dyn Codec>> {
        let supports = &supports;
        let candidates = || self.codecs.iter().filter(move |c| supports(c.as_ref()));

        let exact = if media.is_wildcard() {
            None
        } else {
            candidates().find(|c| {
                c.media_types()
                    .iter()
                    .any(|m| !m.is_wildcard() && m.equals_type_and_subtype(media))
            })
        };

        exact
            .or_else(|| {
                candidates().find(|c| c.media_types().iter().any(|m| m.is_compatible_with(media)))
            })
            .cloned()
    }

    /// Select the decoder for a content type and target kind.
    pub fn decoder_for(&self, media: &MediaType, kind: PayloadKind) -> Result<Arc<dyn Codec>> {
        self.select(media, |c| c.can_decode(kind))
            .ok_or_else(|| unsupported(media, kind))
    }

    /// Select the encoder for a payload kind and optional declared content
    /// type, returning the content type to write.
    pub fn encoder_for(
        &self,
        media: Option<&MediaType>,
        kind: PayloadKind,
    ) -> Result<(Arc<dyn Codec>, MediaType)> {
        let all = MediaType::ALL;
        let requested = media.unwrap_or(&all);
        let codec = self
            .select(requested, |c| c.can_encode(kind))
            .ok_or_else(|| unsupported(requested, kind))?;
        let content_type = match media {
            Some(m) if !m.is_wildcard() => m.clone(),
            _ => codec.default_content_type(),
        };
        Ok((codec, content_type))
    }

    /// Decode a buffered body.
    pub fn decode_bytes(
        &self,
        bytes: Bytes,
        media: &MediaType,
        kind: PayloadKind,
    ) -> Result<Payload> {
        let codec = self.decoder_for(media, kind)?;
        decode_checked(codec.as_ref(), bytes, media, kind)
    }

    /// Buffer a body, honoring the in-memory limit, and decode a single payload.
    pub async fn decode(
        &self,
        body: BodyStream,
        media: &MediaType,
        kind: PayloadKind,
    ) -> Result<Payload> {
        let codec = self.decoder_for(media, kind)?;
        let bytes = body::collect_limited(body, self.max_in_memory_size).await?;
        decode_checked(codec.as_ref(), bytes, media, kind)
    }

    /// Decode a body into a lazy stream of payloads.
    pub fn decode_stream(
        &self,
        body: BodyStream,
        media: &MediaType,
        kind: PayloadKind,
    ) -> Result<PayloadStream> {
        let codec = self.decoder_for(media, kind)?;
        let limit = self.max_in_memory_size;

        // Streaming decoders take the body by value; keep a slot so the
        // buffered fallback can still reach it.
        let slot = Arc::new(parking_lot::Mutex::new(Some(body)));
        let taken = slot.clone();
        let forwarded: BodyStream = Box::pin(
            stream::once(async move { taken.lock().take() })
                .filter_map(|b| async move { b })
                .flatten(),
        );
        if let Some(decoded) = codec.decode_stream(forwarded, media, kind, limit) {
            return Ok(decoded);
        }

        let media = media.clone();
        let buffered = async move {
            let body = slot.lock().take().ok_or_else(|| {
                WebClientError::Codec("response body already subscribed".to_string())
            })?;
            let bytes = body::collect_limited(body, limit).await?;
            decode_checked(codec.as_ref(), bytes, &media, kind)
        };
        Ok(Box::pin(stream::once(buffered)))
    }

    /// Encode a single payload.
    pub fn encode(
        &self,
        payload: Payload,
        media: Option<&MediaType>,
    ) -> Result<(Bytes, MediaType)> {
        let (codec, content_type) = self.encoder_for(media, payload.kind())?;
        let bytes = codec.encode(payload, &content_type)?;
        Ok((bytes, content_type))
    }

    /// Encode a stream of payloads lazily.
    pub fn encode_stream(
        &self,
        payloads: PayloadStream,
        media: Option<&MediaType>,
        kind: PayloadKind,
    ) -> Result<(BodyStream, MediaType)> {
        let (codec, content_type) = self.encoder_for(media, kind)?;
        let slot = Arc::new(parking_lot::Mutex::new(Some(payloads)));
        let taken = slot.clone();
        let forwarded: PayloadStream = Box::pin(
            stream::once(async move { taken.lock().take() })
                .filter_map(|p| async move { p })
                .flatten(),
        );
        if let Some(encoded) = codec.encode_stream(forwarded, &content_type) {
            return Ok((encoded, content_type));
        }

        let media = content_type.clone();
        let payloads = stream::once(async move { slot.lock().take() })
            .filter_map(|p| async move { p })
            .flatten();
        let encoded = payloads.map(move |item| item.and_then(|p| codec.encode(p, &media)));
        Ok((Box::pin(encoded), content_type))
    }
}

fn unsupported(media: &MediaType, kind: PayloadKind) -> WebClientError {
    WebClientError::UnsupportedMediaType {
        content_type: media.to_string(),
        kind,
    }
}

fn decode_checked(
    codec: &dyn Codec,
    bytes: Bytes,
    media: &MediaType,
    kind: PayloadKind,
) -> Result<Payload> {
    let payload = codec.decode(bytes, media, kind)?;
    if payload.kind() != kind {
        return Err(mismatch(kind, &payload));
    }
    Ok(payload)
}

/// Incremental decoder turning body chunks into payloads.
pub(crate) trait FrameDecoder: Send + 'static {
    /// Decode the payloads completed by this chunk.
    fn decode(&mut self, chunk: Bytes) -> Result<Vec<Payload>>;

    /// Decode whatever remains at the end of the body.
    fn finish(&mut self) -> Result<Vec<Payload>>;
}

/// Drive a frame decoder over a body. Chunks are pulled only when the
/// consumer asks for more items.
pub(crate) fn framed<D: FrameDecoder>(body: BodyStream, decoder: D) -> PayloadStream {
    stream::unfold(Some((body, decoder)), |state| async move {
        let (mut body, mut decoder) = state?;
        let (batch, next) = match body.next().await {
            Some(Ok(chunk)) => match decoder.decode(chunk) {
                Ok(items) => (Ok(items), Some((body, decoder))),
                Err(e) => (Err(e), None),
            },
            Some(Err(e)) => (Err(e), None),
            None => (decoder.finish(), None),
        };
        Some((batch, next))
    })
    .flat_map(|batch| match batch {
        Ok(items) => stream::iter(items.into_iter().map(Ok).collect::<Vec<_>>()),
        Err(e) => stream::iter(vec![Err(e)]),
    })
    .boxed()
}

/// Splits a byte stream into lines, dropping `\n` and a trailing `\r`.
pub(crate) struct LineSplitter {
    buffer: BytesMut,
    limit: Option<usize>,
}

impl LineSplitter {
    pub(crate) fn new(limit: Option<usize>) -> Self {
        Self {
            buffer: BytesMut::new(),
            limit,
        }
    }

    pub(crate) fn push(&mut self, chunk: &[u8]) -> Result<Vec<Bytes>> {
        self.buffer.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            if let Some(limit) = self.limit
                && pos > limit
            {
                return Err(WebClientError::DataBufferLimit { limit });
            }
            let mut line = self.buffer.split_to(pos + 1);
            line.truncate(pos);
            lines.push(strip_cr(line.freeze()));
        }
        if let Some(limit) = self.limit
            && self.buffer.len() > limit
        {
            return Err(WebClientError::DataBufferLimit { limit });
        }
        Ok(lines)
    }

    pub(crate) fn finish(&mut self) -> Option<Bytes> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(strip_cr(self.buffer.split().freeze()))
        }
    }
}

fn strip_cr(line: Bytes) -> Bytes {
    if line.last() == Some(&b'\r') {
        line.slice(..line.len() - 1)
    } else {
        line
    }
}

pub(crate) fn utf8(bytes: Bytes) -> Result<String> {
    String::from_utf8(bytes.to_vec()).map_err(|e| WebClientError::Codec(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(parts: &[&str]) -> BodyStream {
        let items: Vec<Result<Bytes>> = parts
            .iter()
            .map(|p| Ok(Bytes::copy_from_slice(p.as_bytes())))
            .collect();
        Box::pin(stream::iter(items))
    }

    struct CsvCodec;

    impl Codec for CsvCodec {
        fn name(&self) -> &'static str {
            "csv"
        }

        fn media_types(&self) -> &[MediaType] {
            const TYPES: &[MediaType] = &[MediaType::from_static("text", "csv")];
            TYPES
        }

        fn can_decode(&self, kind: PayloadKind) -> bool {
            kind == PayloadKind::Structured
        }

        fn can_encode(&self, kind: PayloadKind) -> bool {
            kind == PayloadKind::Structured
        }

        fn decode(&self, bytes: Bytes, _media: &MediaType, _kind: PayloadKind) -> Result<Payload> {
            let text = utf8(bytes)?;
            let cells: Vec<serde_json::Value> = text.trim().split(',').map(|c| c.into()).collect();
            Ok(Payload::Structured(cells.into()))
        }

        fn encode(&self, payload: Payload, _media: &MediaType) -> Result<Bytes> {
            match payload {
                Payload::Structured(serde_json::Value::Array(cells)) => Ok(Bytes::from(
                    cells.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(","),
                )),
                _ => Err(WebClientError::Codec("csv needs an array".to_string())),
            }
        }
    }

    #[test]
    fn test_default_selection() {
        let registry = CodecRegistry::default();
        assert_eq!(registry.codec_names(), vec!["bytes", "json", "form", "sse", "string"]);

        let json = registry
            .decoder_for(&MediaType::APPLICATION_JSON, PayloadKind::Structured)
            .unwrap();
        assert_eq!(json.name(), "json");

        let problem = MediaType::parse("application/problem+json").unwrap();
        let codec = registry.decoder_for(&problem, PayloadKind::Structured).unwrap();
        assert_eq!(codec.name(), "json");

        let text = registry
            .decoder_for(&MediaType::APPLICATION_JSON, PayloadKind::Text)
            .unwrap();
        assert_eq!(text.name(), "string");

        let sse = registry
            .decoder_for(&MediaType::TEXT_EVENT_STREAM, PayloadKind::Text)
            .unwrap();
        assert_eq!(sse.name(), "sse");

        let bytes = registry
            .decoder_for(&MediaType::TEXT_PLAIN, PayloadKind::Bytes)
            .unwrap();
        assert_eq!(bytes.name(), "bytes");
    }

    #[test]
    fn test_unsupported_media_type() {
        let registry = CodecRegistry::default();
        let err = registry
            .decoder_for(&MediaType::TEXT_PLAIN, PayloadKind::Structured)
            .err()
            .unwrap();
        match err {
            WebClientError::UnsupportedMediaType { content_type, kind } => {
                assert_eq!(content_type, "text/plain");
                assert_eq!(kind, PayloadKind::Structured);
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = registry
            .encode(
                Payload::Structured(serde_json::json!({"a": 1})),
                Some(&MediaType::TEXT_PLAIN),
            )
            .unwrap_err();
        assert!(matches!(err, WebClientError::UnsupportedMediaType { .. }));
    }

    #[test]
    fn test_encoder_content_type() {
        let registry = CodecRegistry::default();
        let (bytes, media) = registry
            .encode(Payload::Structured(serde_json::json!({"a": 1})), None)
            .unwrap();
        assert_eq!(&bytes[..], br#"{"a":1}"#);
        assert_eq!(media, MediaType::APPLICATION_JSON);

        let (_, media) = registry.encode(Payload::Text("hi".into()), None).unwrap();
        assert_eq!(media.to_string(), "text/plain;charset=UTF-8");

        let (bytes, media) = registry
            .encode(Payload::Text("{}".into()), Some(&MediaType::APPLICATION_JSON))
            .unwrap();
        assert_eq!(&bytes[..], b"{}");
        assert_eq!(media, MediaType::APPLICATION_JSON);

        let (_, media) = registry.encode(Payload::Bytes(Bytes::new()), None).unwrap();
        assert_eq!(media, MediaType::APPLICATION_OCTET_STREAM);
    }

    #[test]
    fn test_custom_codec_exact_match_wins() {
        let mut registry = CodecRegistry::default();
        registry.register(CsvCodec);
        let csv = MediaType::parse("text/csv").unwrap();

        let payload = registry
            .decode_bytes(Bytes::from_static(b"a,b"), &csv, PayloadKind::Structured)
            .unwrap();
        assert_eq!(payload, Payload::Structured(serde_json::json!(["a", "b"])));

        // Text targets still fall back to the wildcard string codec.
        let codec = registry.decoder_for(&csv, PayloadKind::Text).unwrap();
        assert_eq!(codec.name(), "string");
    }

    #[tokio::test]
    async fn test_decode_respects_limit() {
        let mut registry = CodecRegistry::default();
        registry.set_max_in_memory_size(Some(4));
        let err = registry
            .decode(body(&["hello"]), &MediaType::TEXT_PLAIN, PayloadKind::Text)
            .await
            .unwrap_err();
        assert!(matches!(err, WebClientError::DataBufferLimit { limit: 4 }));
    }

    #[tokio::test]
    async fn test_buffered_stream_fallback() {
        let registry = CodecRegistry::default();
        let form = MediaType::APPLICATION_FORM_URLENCODED;
        let items: Vec<Payload> = registry
            .decode_stream(body(&["a=1&", "b=2"]), &form, PayloadKind::Structured)
            .unwrap()
            .map(|p| p.unwrap())
            .collect()
            .await;
        assert_eq!(items, vec![Payload::Structured(serde_json::json!({"a": "1", "b": "2"}))]);
    }

    #[test]
    fn test_line_splitter() {
        let mut splitter = LineSplitter::new(Some(8));
        assert!(splitter.push(b"ab").unwrap().is_empty());
        let lines = splitter.push(b"c\r\nde\nf").unwrap();
        assert_eq!(lines, vec![Bytes::from_static(b"abc"), Bytes::from_static(b"de")]);
        assert_eq!(splitter.finish(), Some(Bytes::from_static(b"f")));
        assert_eq!(splitter.finish(), None);
        assert!(splitter.push(b"123456789").is_err());
    }

    #[test]
    fn test_line_splitter_bounds_complete_lines() {
        let mut splitter = LineSplitter::new(Some(8));
        assert_eq!(splitter.push(b"12345678
").unwrap().len(), 1);

        let err = splitter
            .push(b"this line is far longer than eight bytes\n")
            .unwrap_err();
        assert!(matches!(err, WebClientError::DataBufferLimit { limit: 8 }));
    }
}
