//! JSON and newline-delimited JSON codec.

use bytes::{Bytes, BytesMut};
use futures::stream::{self, StreamExt};

use super::{Codec, FrameDecoder, LineSplitter, Payload, PayloadKind, PayloadStream, framed};
use crate::body::BodyStream;
use crate::{MediaType, Result, WebClientError};

/// JSON codec for `application/json`, `application/*+json`, and
/// `application/x-ndjson`.
///
/// Streams of values are written as a JSON array, or one document per line
/// for NDJSON. Decoding a stream splits a top-level array into its
/// elements as they arrive.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl JsonCodec {
    fn is_ndjson(media: &MediaType) -> bool {
        media.equals_type_and_subtype(&MediaType::APPLICATION_NDJSON)
    }
}

impl Codec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn media_types(&self) -> &[MediaType] {
        const TYPES: &[MediaType] = &[
            MediaType::APPLICATION_JSON,
            MediaType::APPLICATION_ANY_JSON,
            MediaType::APPLICATION_NDJSON,
        ];
        TYPES
    }

    fn can_decode(&self, kind: PayloadKind) -> bool {
        kind == PayloadKind::Structured
    }

    fn can_encode(&self, kind: PayloadKind) -> bool {
        kind == PayloadKind::Structured
    }

    fn decode(&self, bytes: Bytes, _media: &MediaType, _kind: PayloadKind) -> Result<Payload> {
        Ok(Payload::Structured(serde_json::from_slice(&bytes)?))
    }

    fn decode_stream(
        &self,
        body: BodyStream,
        media: &MediaType,
        _kind: PayloadKind,
        limit: Option<usize>,
    ) -> Option<PayloadStream> {
        if Self::is_ndjson(media) {
            Some(framed(body, JsonLines(LineSplitter::new(limit))))
        } else {
            Some(framed(body, JsonArraySplitter::new(limit)))
        }
    }

    fn encode(&self, payload: Payload, _media: &MediaType) -> Result<Bytes> {
        match payload {
            Payload::Structured(value) => Ok(Bytes::from(serde_json::to_vec(&value)?)),
            other => Err(WebClientError::Codec(format!(
                "json codec cannot encode {} payloads",
                other.kind()
            ))),
        }
    }

    fn encode_stream(&self, payloads: PayloadStream, media: &MediaType) -> Option<BodyStream> {
        let codec = *self;
        let media = media.clone();

        if Self::is_ndjson(&media) {
            let lines = payloads.map(move |item: Result<Payload>| -> Result<Bytes> {
                let mut line = BytesMut::from(&codec.encode(item?, &media)?[..]);
                line.extend_from_slice(b"\n");
                Ok(line.freeze())
            });
            return Some(lines.boxed());
        }

        let elements = payloads
            .enumerate()
            .map(move |(index, item): (usize, Result<Payload>)| -> Result<Bytes> {
                let encoded = codec.encode(item?, &media)?;
                if index == 0 {
                    Ok(encoded)
                } else {
                    let mut element = BytesMut::with_capacity(encoded.len() + 1);
                    element.extend_from_slice(b",");
                    element.extend_from_slice(&encoded);
                    Ok(element.freeze())
                }
            });
        let array = stream::once(async { Ok(Bytes::from_static(b"[")) })
            .chain(elements)
            .chain(stream::once(async { Ok(Bytes::from_static(b"]")) }));
        Some(array.boxed())
    }
}

struct JsonLines(LineSplitter);

impl FrameDecoder for JsonLines {
    fn decode(&mut self, chunk: Bytes) -> Result<Vec<Payload>> {
        self.0
            .push(&chunk)?
            .into_iter()
            .filter(|line| !line.iter().all(u8::is_ascii_whitespace))
            .map(|line| Ok(Payload::Structured(serde_json::from_slice(&line)?)))
            .collect()
    }

    fn finish(&mut self) -> Result<Vec<Payload>> {
        match self.0.finish() {
            Some(line) if !line.iter().all(u8::is_ascii_whitespace) => {
                Ok(vec![Payload::Structured(serde_json::from_slice(&line)?)])
            }
            _ => Ok(Vec::new()),
        }
    }
}

/// Incremental tokenizer emitting the elements of a top-level JSON array,
/// or each complete top-level value when the body is not an array.
struct JsonArraySplitter {
    buffer: Vec<u8>,
    depth: usize,
    in_string: bool,
    escaped: bool,
    array: Option<bool>,
    done: bool,
    limit: Option<usize>,
}

impl JsonArraySplitter {
    fn new(limit: Option<usize>) -> Self {
        Self {
            buffer: Vec::new(),
            depth: 0,
            in_string: false,
            escaped: false,
            array: None,
            done: false,
            limit,
        }
    }

    fn flush(&mut self, out: &mut Vec<Payload>) -> Result<()> {
        if let Some(limit) = self.limit
            && self.buffer.len() > limit
        {
            return Err(WebClientError::DataBufferLimit { limit });
        }
        if !self.buffer.iter().all(u8::is_ascii_whitespace) {
            out.push(Payload::Structured(serde_json::from_slice(&self.buffer)?));
        }
        self.buffer.clear();
        Ok(())
    }

    fn feed(&mut self, byte: u8, out: &mut Vec<Payload>) -> Result<()> {
        if self.done {
            if !byte.is_ascii_whitespace() {
                return Err(WebClientError::Codec(
                    "unexpected data after top-level JSON array".to_string(),
                ));
            }
            return Ok(());
        }

        let array = match self.array {
            Some(array) => array,
            None if byte.is_ascii_whitespace() => return Ok(()),
            None => {
                let array = byte == b'[';
                self.array = Some(array);
                if array {
                    self.depth = 1;
                    return Ok(());
                }
                array
            }
        };

        if self.in_string {
            self.buffer.push(byte);
            if self.escaped {
                self.escaped = false;
            } else if byte == b'\\' {
                self.escaped = true;
            } else if byte == b'"' {
                self.in_string = false;
            }
            return Ok(());
        }

        match byte {
            b'"' => {
                self.in_string = true;
                self.buffer.push(byte);
            }
            b'{' | b'[' => {
                self.depth += 1;
                self.buffer.push(byte);
            }
            b']' if array && self.depth == 1 => {
                self.flush(out)?;
                self.depth = 0;
                self.done = true;
            }
            b'}' | b']' => {
                self.depth = self.depth.saturating_sub(1);
                self.buffer.push(byte);
                if !array && self.depth == 0 {
                    self.flush(out)?;
                }
            }
            b',' if array && self.depth == 1 => self.flush(out)?,
            _ => self.buffer.push(byte),
        }
        Ok(())
    }
}

impl FrameDecoder for JsonArraySplitter {
    fn decode(&mut self, chunk: Bytes) -> Result<Vec<Payload>> {
        let mut out = Vec::new();
        for byte in chunk.iter().copied() {
            self.feed(byte, &mut out)?;
        }
        if let Some(limit) = self.limit
            && self.buffer.len() > limit
        {
            return Err(WebClientError::DataBufferLimit { limit });
        }
        Ok(out)
    }

    fn finish(&mut self) -> Result<Vec<Payload>> {
        if self.array == Some(true) && !self.done {
            return Err(WebClientError::Codec("unterminated JSON array".to_string()));
        }
        let mut out = Vec::new();
        self.flush(&mut out)?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::collect_limited;
    use serde_json::json;

    fn body(parts: &[&str]) -> BodyStream {
        let items: Vec<Result<Bytes>> = parts
            .iter()
            .map(|p| Ok(Bytes::copy_from_slice(p.as_bytes())))
            .collect();
        Box::pin(stream::iter(items))
    }

    async fn decode_all(parts: &[&str], media: &MediaType) -> Vec<serde_json::Value> {
        JsonCodec
            .decode_stream(body(parts), media, PayloadKind::Structured, None)
            .unwrap()
            .map(|p| match p.unwrap() {
                Payload::Structured(v) => v,
                other => panic!("unexpected payload {other:?}"),
            })
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_array_split_across_chunks() {
        let values = decode_all(
            &["[{\"name\":\"a,]\"},", " {\"n\":[1,", "2]}, 3, \"x\\\"y\"", "]"],
            &MediaType::APPLICATION_JSON,
        )
        .await;
        assert_eq!(
            values,
            vec![json!({"name": "a,]"}), json!({"n": [1, 2]}), json!(3), json!("x\"y")]
        );
    }

    #[tokio::test]
    async fn test_non_array_value() {
        let values = decode_all(&["{\"a\":", "1}"], &MediaType::APPLICATION_JSON).await;
        assert_eq!(values, vec![json!({"a": 1})]);

        let values = decode_all(&["[]"], &MediaType::APPLICATION_JSON).await;
        assert!(values.is_empty());
    }

    #[tokio::test]
    async fn test_ndjson_lines() {
        let values = decode_all(
            &["{\"id\":1}\n{\"id\"", ":2}\n\n{\"id\":3}"],
            &MediaType::APPLICATION_NDJSON,
        )
        .await;
        assert_eq!(values, vec![json!({"id": 1}), json!({"id": 2}), json!({"id": 3})]);
    }

    #[tokio::test]
    async fn test_unterminated_array_fails() {
        let results: Vec<Result<Payload>> = JsonCodec
            .decode_stream(
                body(&["[1,2"]),
                &MediaType::APPLICATION_JSON,
                PayloadKind::Structured,
                None,
            )
            .unwrap()
            .collect()
            .await;
        assert!(matches!(results.last(), Some(Err(WebClientError::Codec(_)))));
    }

    #[tokio::test]
    async fn test_oversized_element_in_single_chunk() {
        let items: Vec<Result<Payload>> = JsonCodec
            .decode_stream(
                body(&[r#"["ok", "0123456789abcdefghijklmnopqrstuvwxyz"]"#]),
                &MediaType::APPLICATION_JSON,
                PayloadKind::Structured,
                Some(8),
            )
            .unwrap()
            .collect()
            .await;

        assert!(matches!(
            items.last(),
            Some(Err(WebClientError::DataBufferLimit { limit: 8 }))
        ));
        assert!(items.iter().all(|item| match item {
            Ok(Payload::Structured(v)) => v == "ok",
            _ => true,
        }));
    }

    #[tokio::test]
    async fn test_encode_stream_as_array_and_ndjson() {
        let items = || -> PayloadStream {
            Box::pin(stream::iter(vec![
                Ok(Payload::Structured(json!({"a": 1}))),
                Ok(Payload::Structured(json!({"a": 2}))),
            ]))
        };

        let array = JsonCodec
            .encode_stream(items(), &MediaType::APPLICATION_JSON)
            .unwrap();
        let bytes = collect_limited(array, None).await.unwrap();
        assert_eq!(&bytes[..], br#"[{"a":1},{"a":2}]"#);

        let lines = JsonCodec
            .encode_stream(items(), &MediaType::APPLICATION_NDJSON)
            .unwrap();
        let bytes = collect_limited(lines, None).await.unwrap();
        assert_eq!(&bytes[..], b"{\"a\":1}\n{\"a\":2}\n");
    }
}
