//! Media types used for content negotiation and codec selection.

use http::HeaderValue;
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use crate::{Result, WebClientError};

/// A parsed media type such as `application/json; charset=utf-8`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaType {
    kind: Cow<'static, str>,
    subtype: Cow<'static, str>,
    params: Vec<(String, String)>,
}

impl MediaType {
    /// `*/*`
    pub const ALL: MediaType = MediaType::from_static("*", "*");
    /// `application/json`
    pub const APPLICATION_JSON: MediaType = MediaType::from_static("application", "json");
    /// `application/*+json`
    pub const APPLICATION_ANY_JSON: MediaType = MediaType::from_static("application", "*+json");
    /// `application/x-ndjson`
    pub const APPLICATION_NDJSON: MediaType = MediaType::from_static("application", "x-ndjson");
    /// `application/octet-stream`
    pub const APPLICATION_OCTET_STREAM: MediaType =
        MediaType::from_static("application", "octet-stream");
    /// `application/x-www-form-urlencoded`
    pub const APPLICATION_FORM_URLENCODED: MediaType =
        MediaType::from_static("application", "x-www-form-urlencoded");
    /// `text/plain`
    pub const TEXT_PLAIN: MediaType = MediaType::from_static("text", "plain");
    /// `text/event-stream`
    pub const TEXT_EVENT_STREAM: MediaType = MediaType::from_static("text", "event-stream");

    /// Create a media type from static parts.
    pub const fn from_static(kind: &'static str, subtype: &'static str) -> Self {
        Self {
            kind: Cow::Borrowed(kind),
            subtype: Cow::Borrowed(subtype),
            params: Vec::new(),
        }
    }

    /// Parse a media type, lower-casing type, subtype, and parameter names.
    pub fn parse(value: &str) -> Result<Self> {
        let mut parts = value.split(';');
        let essence = parts.next().unwrap_or_default().trim();
        let (kind, subtype) = match essence {
            "*" => ("*", "*"),
            _ => essence
                .split_once('/')
                .ok_or_else(|| invalid(value, "does not contain '/'"))?,
        };
        let kind = kind.trim();
        let subtype = subtype.trim();
        if kind.is_empty() || subtype.is_empty() {
            return Err(invalid(value, "empty type or subtype"));
        }
        if kind == "*" && subtype != "*" {
            return Err(invalid(value, "wildcard type is legal only in '*/*'"));
        }

        let mut params = Vec::new();
        for param in parts {
            let param = param.trim();
            if param.is_empty() {
                continue;
            }
            let (name, val) = param
                .split_once('=')
                .ok_or_else(|| invalid(value, "parameter without '='"))?;
            params.push((
                name.trim().to_ascii_lowercase(),
                val.trim().trim_matches('"').to_string(),
            ));
        }

        Ok(Self {
            kind: Cow::Owned(kind.to_ascii_lowercase()),
            subtype: Cow::Owned(subtype.to_ascii_lowercase()),
            params,
        })
    }

    /// Primary type, e.g. `application`.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Subtype, e.g. `json`.
    pub fn subtype(&self) -> &str {
        &self.subtype
    }

    /// `type/subtype` without parameters.
    pub fn essence(&self) -> String {
        format!("{}/{}", self.kind, self.subtype)
    }

    /// Get a parameter value by name.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The `charset` parameter, if present.
    pub fn charset(&self) -> Option<&str> {
        self.param("charset")
    }

    /// Return a copy with the parameter set.
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into().to_ascii_lowercase();
        self.params.retain(|(n, _)| *n != name);
        self.params.push((name, value.into()));
        self
    }

    /// Check for a `*` type or a `*` / `*+suffix` subtype.
    pub fn is_wildcard(&self) -> bool {
        self.kind == "*" || self.is_wildcard_subtype()
    }

    fn is_wildcard_subtype(&self) -> bool {
        self.subtype == "*" || self.subtype.starts_with("*+")
    }

    /// Compare type and subtype, ignoring parameters.
    pub fn equals_type_and_subtype(&self, other: &MediaType) -> bool {
        self.kind == other.kind && self.subtype == other.subtype
    }

    /// Check whether this media type includes `other`.
    ///
    /// `*/*` includes everything, `text/*` includes `text/plain`, and
    /// `application/*+json` includes `application/problem+json`.
    pub fn includes(&self, other: &MediaType) -> bool {
        if self.kind == "*" {
            return true;
        }
        if self.kind != other.kind {
            return false;
        }
        if self.subtype == other.subtype || self.subtype == "*" {
            return true;
        }
        match self.subtype.strip_prefix('*') {
            Some(suffix) if suffix.starts_with('+') => {
                other.subtype.ends_with(suffix) || other.subtype == suffix[1..]
            }
            _ => false,
        }
    }

    /// Check whether either media type includes the other.
    pub fn is_compatible_with(&self, other: &MediaType) -> bool {
        self.includes(other) || other.includes(self)
    }

    /// Convert to a header value.
    pub fn to_header_value(&self) -> Result<HeaderValue> {
        HeaderValue::from_str(&self.to_string())
            .map_err(|e| WebClientError::InvalidRequestState(e.to_string()))
    }

    /// Parse the media type from a header value.
    pub fn from_header(value: &HeaderValue) -> Result<Self> {
        let value = value
            .to_str()
            .map_err(|e| WebClientError::InvalidRequestState(e.to_string()))?;
        Self::parse(value)
    }
}

fn invalid(value: &str, reason: &str) -> WebClientError {
    WebClientError::InvalidRequestState(format!("Invalid media type '{}': {}", value, reason))
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.subtype)?;
        for (name, value) in &self.params {
            write!(f, ";{}={}", name, value)?;
        }
        Ok(())
    }
}

impl FromStr for MediaType {
    type Err = WebClientError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
