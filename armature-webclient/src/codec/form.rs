//! URL-encoded form codec.

use bytes::Bytes;
use serde_json::{Map, Value};

use super::{Codec, Payload, PayloadKind};
use crate::{MediaType, Result, WebClientError};

/// Codec for `application/x-www-form-urlencoded`.
///
/// Forms decode into an object of string values; a repeated key becomes an
/// array of its values. Only flat objects can be encoded.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormCodec;

impl Codec for FormCodec {
    fn name(&self) -> &'static str {
        "form"
    }

    fn media_types(&self) -> &[MediaType] {
        const TYPES: &[MediaType] = &[MediaType::APPLICATION_FORM_URLENCODED];
        TYPES
    }

    fn can_decode(&self, kind: PayloadKind) -> bool {
        kind == PayloadKind::Structured
    }

    fn can_encode(&self, kind: PayloadKind) -> bool {
        kind == PayloadKind::Structured
    }

    fn decode(&self, bytes: Bytes, _media: &MediaType, _kind: PayloadKind) -> Result<Payload> {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(&bytes)
            .map_err(|e| WebClientError::Codec(e.to_string()))?;

        let mut form = Map::new();
        for (key, value) in pairs {
            match form.get_mut(&key) {
                None => {
                    form.insert(key, Value::String(value));
                }
                Some(Value::Array(values)) => values.push(Value::String(value)),
                Some(existing) => {
                    let first = existing.take();
                    *existing = Value::Array(vec![first, Value::String(value)]);
                }
            }
        }
        Ok(Payload::Structured(Value::Object(form)))
    }

    fn encode(&self, payload: Payload, _media: &MediaType) -> Result<Bytes> {
        let value = match payload {
            Payload::Structured(value) => value,
            other => {
                return Err(WebClientError::Codec(format!(
                    "form codec cannot encode {} payloads",
                    other.kind()
                )));
            }
        };
        let Value::Object(fields) = value else {
            return Err(WebClientError::Codec("form body must be an object".to_string()));
        };

        let mut pairs = Vec::with_capacity(fields.len());
        for (key, value) in fields {
            match value {
                Value::Array(values) => {
                    for value in values {
                        pairs.push((key.clone(), scalar(&key, value)?));
                    }
                }
                value => pairs.push((key.clone(), scalar(&key, value)?)),
            }
        }

        serde_urlencoded::to_string(&pairs)
            .map(Bytes::from)
            .map_err(|e| WebClientError::Codec(e.to_string()))
    }
}

fn scalar(key: &str, value: Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s),
        Value::Null => Ok(String::new()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(WebClientError::Codec(format!(
            "form field '{}' must be a scalar",
            key
        ))),
    }
}
