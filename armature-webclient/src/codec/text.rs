//! Raw byte and plain text codecs.

use bytes::Bytes;
use futures::StreamExt;

use super::{Codec, FrameDecoder, LineSplitter, Payload, PayloadKind, PayloadStream, framed, utf8};
use crate::body::BodyStream;
use crate::{MediaType, Result, WebClientError};

/// Passes bytes through unchanged, for any content type.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesCodec;

impl Codec for BytesCodec {
    fn name(&self) -> &'static str {
        "bytes"
    }

    fn media_types(&self) -> &[MediaType] {
        const TYPES: &[MediaType] = &[MediaType::ALL];
        TYPES
    }

    fn can_decode(&self, kind: PayloadKind) -> bool {
        kind == PayloadKind::Bytes
    }

    fn can_encode(&self, kind: PayloadKind) -> bool {
        kind == PayloadKind::Bytes
    }

    fn decode(&self, bytes: Bytes, _media: &MediaType, _kind: PayloadKind) -> Result<Payload> {
        Ok(Payload::Bytes(bytes))
    }

    fn decode_stream(
        &self,
        body: BodyStream,
        _media: &MediaType,
        _kind: PayloadKind,
        _limit: Option<usize>,
    ) -> Option<PayloadStream> {
        Some(body.map(|chunk| chunk.map(Payload::Bytes)).boxed())
    }

    fn encode(&self, payload: Payload, _media: &MediaType) -> Result<Bytes> {
        match payload {
            Payload::Bytes(bytes) => Ok(bytes),
            other => Err(WebClientError::Codec(format!(
                "bytes codec cannot encode {} payloads",
                other.kind()
            ))),
        }
    }
}

/// UTF-8 text codec. Reads text from any content type; streams split on newlines.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringCodec;

impl Codec for StringCodec {
    fn name(&self) -> &'static str {
        "string"
    }

    fn media_types(&self) -> &[MediaType] {
        const TYPES: &[MediaType] = &[MediaType::TEXT_PLAIN, MediaType::ALL];
        TYPES
    }

    fn can_decode(&self, kind: PayloadKind) -> bool {
        kind == PayloadKind::Text
    }

    fn can_encode(&self, kind: PayloadKind) -> bool {
        kind == PayloadKind::Text
    }

    fn default_content_type(&self) -> MediaType {
        MediaType::TEXT_PLAIN.with_param("charset", "UTF-8")
    }

    fn decode(&self, bytes: Bytes, media: &MediaType, _kind: PayloadKind) -> Result<Payload> {
        check_charset(media)?;
        Ok(Payload::Text(utf8(bytes)?))
    }

    fn decode_stream(
        &self,
        body: BodyStream,
        media: &MediaType,
        _kind: PayloadKind,
        limit: Option<usize>,
    ) -> Option<PayloadStream> {
        if let Err(e) = check_charset(media) {
            return Some(futures::stream::once(async move { Err(e) }).boxed());
        }
        Some(framed(body, TextLines(LineSplitter::new(limit))))
    }

    fn encode(&self, payload: Payload, _media: &MediaType) -> Result<Bytes> {
        match payload {
            Payload::Text(text) => Ok(Bytes::from(text)),
            other => Err(WebClientError::Codec(format!(
                "string codec cannot encode {} payloads",
                other.kind()
            ))),
        }
    }
}

fn is_utf8_compatible(charset: &str) -> bool {
    charset.eq_ignore_ascii_case("utf-8") || charset.eq_ignore_ascii_case("us-ascii")
}

fn check_charset(media: &MediaType) -> Result<()> {
    match media.charset() {
        Some(charset) if is_utf8_compatible(charset) => Ok(()),
        Some(charset) => Err(WebClientError::Codec(format!(
            "unsupported charset '{}'",
            charset
        ))),
        None => Ok(()),
    }
}

struct TextLines(LineSplitter);

impl FrameDecoder for TextLines {
    fn decode(&mut self, chunk: Bytes) -> Result<Vec<Payload>> {
        self.0
            .push(&chunk)?
            .into_iter()
            .map(|line| utf8(line).map(Payload::Text))
            .collect()
    }

    fn finish(&mut self) -> Result<Vec<Payload>> {
        self.0
            .finish()
            .map(|line| utf8(line).map(Payload::Text))
            .into_iter()
            .collect()
    }
}
