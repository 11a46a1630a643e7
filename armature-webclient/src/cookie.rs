//! Response cookies parsed from `Set-Cookie` headers.

use http::HeaderMap;
use http::header::SET_COOKIE;
use std::time::Duration;

/// A cookie set by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseCookie {
    name: String,
    value: String,
    domain: Option<String>,
    path: Option<String>,
    max_age: Option<Duration>,
    secure: bool,
    http_only: bool,
    same_site: Option<String>,
}

impl ResponseCookie {
    /// Parse a `Set-Cookie` header value.
    pub fn parse(header: &str) -> Option<Self> {
        let mut parts = header.split(';');
        let (name, value) = parts.next()?.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        let mut cookie = Self {
            name: name.to_string(),
            value: value.trim().trim_matches('"').to_string(),
            domain: None,
            path: None,
            max_age: None,
            secure: false,
            http_only: false,
            same_site: None,
        };

        for attribute in parts {
            let (key, value) = match attribute.split_once('=') {
                Some((k, v)) => (k.trim(), Some(v.trim())),
                None => (attribute.trim(), None),
            };
            match (key.to_ascii_lowercase().as_str(), value) {
                ("domain", Some(v)) => cookie.domain = Some(v.trim_start_matches('.').to_string()),
                ("path", Some(v)) => cookie.path = Some(v.to_string()),
                ("max-age", Some(v)) => {
                    cookie.max_age = v
                        .parse::<i64>()
                        .ok()
                        .map(|secs| Duration::from_secs(secs.max(0) as u64));
                }
                ("secure", _) => cookie.secure = true,
                ("httponly", _) => cookie.http_only = true,
                ("samesite", Some(v)) => cookie.same_site = Some(v.to_string()),
                _ => {}
            }
        }
        Some(cookie)
    }

    /// Parse every `Set-Cookie` header, skipping malformed values.
    pub fn from_headers(headers: &HeaderMap) -> Vec<Self> {
        headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .filter_map(Self::parse)
            .collect()
    }

    /// Cookie name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cookie value.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Domain attribute.
    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }

    /// Path attribute.
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Max-Age attribute; zero or negative values become zero.
    pub fn max_age(&self) -> Option<Duration> {
        self.max_age
    }

    /// Secure attribute.
    pub fn is_secure(&self) -> bool {
        self.secure
    }

    /// HttpOnly attribute.
    pub fn is_http_only(&self) -> bool {
        self.http_only
    }

    /// SameSite attribute.
    pub fn same_site(&self) -> Option<&str> {
        self.same_site.as_deref()
    }
}
