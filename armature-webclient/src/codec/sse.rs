//! Server-sent events codec.

use bytes::Bytes;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use std::time::Duration;

use super::{Codec, FrameDecoder, LineSplitter, Payload, PayloadKind, PayloadStream, framed, utf8};
use crate::body::BodyStream;
use crate::{MediaType, Result, WebClientError};

/// A single server-sent event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerSentEvent {
    /// Event id.
    pub id: Option<String>,
    /// Event type.
    pub event: Option<String>,
    /// Event data; multiple `data:` lines are joined with `\n`.
    pub data: Option<String>,
    /// Reconnection time requested by the server.
    pub retry: Option<Duration>,
    /// Comment lines.
    pub comment: Option<String>,
}

impl ServerSentEvent {
    /// Create an event with data only.
    pub fn data(data: impl Into<String>) -> Self {
        Self {
            data: Some(data.into()),
            ..Default::default()
        }
    }

    /// Set the event id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the event type.
    pub fn with_event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    /// Parse the data as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        let data = self
            .data
            .as_deref()
            .ok_or_else(|| WebClientError::Codec("event has no data".to_string()))?;
        Ok(serde_json::from_str(data)?)
    }

    fn is_empty(&self) -> bool {
        self.id.is_none()
            && self.event.is_none()
            && self.data.is_none()
            && self.retry.is_none()
            && self.comment.is_none()
    }

    fn encode(&self) -> String {
        let mut out = String::new();
        if let Some(comment) = &self.comment {
            for line in comment.lines() {
                out.push(':');
                out.push_str(line);
                out.push('\n');
            }
        }
        if let Some(id) = &self.id {
            out.push_str(&format!("id:{}\n", id));
        }
        if let Some(event) = &self.event {
            out.push_str(&format!("event:{}\n", event));
        }
        if let Some(retry) = self.retry {
            out.push_str(&format!("retry:{}\n", retry.as_millis()));
        }
        if let Some(data) = &self.data {
            for line in data.split('\n') {
                out.push_str(&format!("data:{}\n", line));
            }
        }
        out.push('\n');
        out
    }
}

/// Codec for `text/event-stream`.
///
/// Decodes into events, or into the event data as text or JSON. Events
/// are dispatched at each blank line, so a stream yields every event as
/// soon as its terminating line arrives.
#[derive(Debug, Clone, Copy, Default)]
pub struct SseCodec;

impl Codec for SseCodec {
    fn name(&self) -> &'static str {
        "sse"
    }

    fn media_types(&self) -> &[MediaType] {
        const TYPES: &[MediaType] = &[MediaType::TEXT_EVENT_STREAM];
        TYPES
    }

    fn can_decode(&self, kind: PayloadKind) -> bool {
        matches!(
            kind,
            PayloadKind::Event | PayloadKind::Text | PayloadKind::Structured
        )
    }

    fn can_encode(&self, kind: PayloadKind) -> bool {
        kind == PayloadKind::Event
    }

    fn decode(&self, bytes: Bytes, _media: &MediaType, kind: PayloadKind) -> Result<Payload> {
        let mut parser = EventParser::new(kind, None);
        let mut events = parser.decode(bytes)?;
        events.extend(parser.finish()?);
        events
            .into_iter()
            .next()
            .ok_or_else(|| WebClientError::Codec("event stream contained no events".to_string()))
    }

    fn decode_stream(
        &self,
        body: BodyStream,
        _media: &MediaType,
        kind: PayloadKind,
        limit: Option<usize>,
    ) -> Option<PayloadStream> {
        Some(framed(body, EventParser::new(kind, limit)))
    }

    fn encode(&self, payload: Payload, _media: &MediaType) -> Result<Bytes> {
        match payload {
            Payload::Event(event) => Ok(Bytes::from(event.encode())),
            other => Err(WebClientError::Codec(format!(
                "sse codec cannot encode {} payloads",
                other.kind()
            ))),
        }
    }

    fn encode_stream(&self, payloads: PayloadStream, media: &MediaType) -> Option<BodyStream> {
        let codec = *self;
        let media = media.clone();
        Some(
            payloads
                .map(move |item| item.and_then(|p| codec.encode(p, &media)))
                .boxed(),
        )
    }
}

struct EventParser {
    lines: LineSplitter,
    current: ServerSentEvent,
    current_size: usize,
    kind: PayloadKind,
    limit: Option<usize>,
}

impl EventParser {
    fn new(kind: PayloadKind, limit: Option<usize>) -> Self {
        Self {
            lines: LineSplitter::new(limit),
            current: ServerSentEvent::default(),
            current_size: 0,
            kind,
            limit,
        }
    }

    fn line(&mut self, line: Bytes, out: &mut Vec<Payload>) -> Result<()> {
        let line = utf8(line)?;
        if line.is_empty() {
            let event = std::mem::take(&mut self.current);
            self.current_size = 0;
            if !event.is_empty() {
                self.dispatch(event, out)?;
            }
            return Ok(());
        }

        self.current_size += line.len() + 1;
        if let Some(limit) = self.limit
            && self.current_size > limit
        {
            return Err(WebClientError::DataBufferLimit { limit });
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line.as_str(), ""),
        };
        match field {
            "" => append(&mut self.current.comment, value),
            "data" => append(&mut self.current.data, value),
            "id" => self.current.id = Some(value.to_string()),
            "event" => self.current.event = Some(value.to_string()),
            "retry" => {
                if let Ok(millis) = value.parse::<u64>() {
                    self.current.retry = Some(Duration::from_millis(millis));
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn dispatch(&self, event: ServerSentEvent, out: &mut Vec<Payload>) -> Result<()> {
        match self.kind {
            PayloadKind::Event => out.push(Payload::Event(event)),
            PayloadKind::Text => {
                if let Some(data) = event.data {
                    out.push(Payload::Text(data));
                }
            }
            PayloadKind::Structured => {
                if let Some(data) = event.data {
                    out.push(Payload::Structured(serde_json::from_str(&data)?));
                }
            }
            PayloadKind::Bytes => {
                return Err(WebClientError::Codec(
                    "event streams do not decode into bytes".to_string(),
                ));
            }
        }
        Ok(())
    }
}

fn append(field: &mut Option<String>, value: &str) {
    match field {
        Some(existing) => {
            existing.push('\n');
            existing.push_str(value);
        }
        None => *field = Some(value.to_string()),
    }
}

impl FrameDecoder for EventParser {
    fn decode(&mut self, chunk: Bytes) -> Result<Vec<Payload>> {
        let mut out = Vec::new();
        for line in self.lines.push(&chunk)? {
            self.line(line, &mut out)?;
        }
        Ok(out)
    }

    fn finish(&mut self) -> Result<Vec<Payload>> {
        let mut out = Vec::new();
        if let Some(line) = self.lines.finish() {
            self.line(line, &mut out)?;
        }
        let event = std::mem::take(&mut self.current);
        if !event.is_empty() {
            self.dispatch(event, &mut out)?;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use serde_json::json;

    fn body(parts: &[&str]) -> BodyStream {
        let items: Vec<Result<Bytes>> = parts
            .iter()
            .map(|p| Ok(Bytes::copy_from_slice(p.as_bytes())))
            .collect();
        Box::pin(stream::iter(items))
    }

    async fn decode(parts: &[&str], kind: PayloadKind) -> Vec<Payload> {
        SseCodec
            .decode_stream(body(parts), &MediaType::TEXT_EVENT_STREAM, kind, None)
            .unwrap()
            .map(|p| p.unwrap())
            .collect()
            .await
    }

    #[tokio::test]
    async fn test_parse_fields() {
        let events = decode(
            &[
                ": keep-alive\n\n",
                "id: 7\nevent: price\nretry: 1500\nda",
                "ta: line one\ndata:line two\n\n",
            ],
            PayloadKind::Event,
        )
        .await;

        assert_eq!(
            events,
            vec![
                Payload::Event(ServerSentEvent {
                    comment: Some("keep-alive".into()),
                    ..Default::default()
                }),
                Payload::Event(ServerSentEvent {
                    id: Some("7".into()),
                    event: Some("price".into()),
                    data: Some("line one\nline two".into()),
                    retry: Some(Duration::from_millis(1500)),
                    comment: None,
                }),
            ]
        );
    }

    #[tokio::test]
    async fn test_data_as_text_and_json() {
        let texts = decode(&[":c\n\ndata: a\n\ndata: b"], PayloadKind::Text).await;
        assert_eq!(texts, vec![Payload::Text("a".into()), Payload::Text("b".into())]);

        let values = decode(&["data: {\"n\":1}\r\n\r\n"], PayloadKind::Structured).await;
        assert_eq!(values, vec![Payload::Structured(json!({"n": 1}))]);
    }

    #[tokio::test]
    async fn test_event_size_is_bounded() {
        let chunk = "data: xxxxxx\n".repeat(50) + "\n";
        let items: Vec<Result<Payload>> = SseCodec
            .decode_stream(
                body(&[chunk.as_str()]),
                &MediaType::TEXT_EVENT_STREAM,
                PayloadKind::Event,
                Some(64),
            )
            .unwrap()
            .collect()
            .await;

        assert_eq!(items.len(), 1);
        assert!(matches!(
            items[0],
            Err(WebClientError::DataBufferLimit { limit: 64 })
        ));
    }

    #[test]
    fn test_encode_event() {
        let event = ServerSentEvent::data("a\nb").with_id("1").with_event("tick");
        let bytes = SseCodec
            .encode(Payload::Event(event), &MediaType::TEXT_EVENT_STREAM)
            .unwrap();
        assert_eq!(&bytes[..], b"id:1\nevent:tick\ndata:a\ndata:b\n\n");
    }

    #[test]
    fn test_event_json_data() {
        let event = ServerSentEvent::data("{\"ok\":true}");
        let value: serde_json::Value = event.json().unwrap();
        assert_eq!(value["ok"], true);
        assert!(ServerSentEvent::default().json::<serde_json::Value>().is_err());
    }
}
