//! Immutable request handed to filters and connectors.

use http::{HeaderMap, HeaderName, HeaderValue, Method};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use url::Url;

use crate::Body;

static NEXT_EXCHANGE_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier of one exchange, used as a log prefix and as the release key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExchangeId(u64);

impl ExchangeId {
    /// Allocate a new process-unique id.
    pub fn next() -> Self {
        Self(NEXT_EXCHANGE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Numeric value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

/// A fully built request.
///
/// Requests are immutable; filters derive modified copies with
/// [`ClientRequest::mutate`].
#[derive(Debug, Clone)]
pub struct ClientRequest {
    id: ExchangeId,
    method: Method,
    url: Url,
    headers: HeaderMap,
    cookies: BTreeMap<String, Vec<String>>,
    attributes: HashMap<String, String>,
    body: Body,
}

impl ClientRequest {
    /// Create a builder for a new request.
    pub fn builder(method: Method, url: Url) -> ClientRequestBuilder {
        ClientRequestBuilder {
            id: ExchangeId::next(),
            method,
            url,
            headers: HeaderMap::new(),
            cookies: BTreeMap::new(),
            attributes: HashMap::new(),
            body: Body::Empty,
        }
    }

    /// Exchange id.
    pub fn id(&self) -> ExchangeId {
        self.id
    }

    /// HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Absolute request URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Request cookies by name.
    pub fn cookies(&self) -> &BTreeMap<String, Vec<String>> {
        &self.cookies
    }

    /// Get a request attribute.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Request attributes; visible to filters, never sent.
    pub fn attributes(&self) -> &HashMap<String, String> {
        &self.attributes
    }

    /// Request body.
    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Consume the request and return its body.
    pub fn into_body(self) -> Body {
        self.body
    }

    /// Render the cookies as a `Cookie` header value.
    pub fn cookie_header(&self) -> Option<String> {
        let pairs: Vec<String> = self
            .cookies
            .iter()
            .flat_map(|(name, values)| values.iter().map(move |v| format!("{}={}", name, v)))
            .collect();
        if pairs.is_empty() {
            None
        } else {
            Some(pairs.join("; "))
        }
    }

    /// Start a builder pre-populated from this request, keeping its id.
    pub fn mutate(&self) -> ClientRequestBuilder {
        ClientRequestBuilder {
            id: self.id,
            method: self.method.clone(),
            url: self.url.clone(),
            headers: self.headers.clone(),
            cookies: self.cookies.clone(),
            attributes: self.attributes.clone(),
            body: self.body.clone(),
        }
    }
}

/// Builder for a [`ClientRequest`], mainly used by filters.
#[derive(Debug, Clone)]
pub struct ClientRequestBuilder {
    id: ExchangeId,
    method: Method,
    url: Url,
    headers: HeaderMap,
    cookies: BTreeMap<String, Vec<String>>,
    attributes: HashMap<String, String>,
    body: Body,
}

impl ClientRequestBuilder {
    /// Set the method.
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Set the URL.
    pub fn url(mut self, url: Url) -> Self {
        self.url = url;
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

    /// Set a cookie, replacing existing values.
    pub fn cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), vec![value.into()]);
        self
    }

    /// Manipulate the cookies.
    pub fn cookies(mut self, f: impl FnOnce(&mut BTreeMap<String, Vec<String>>)) -> Self {
        f(&mut self.cookies);
        self
    }

    /// Set an attribute.
    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Set the body.
    pub fn body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    /// Build the request.
    pub fn build(self) -> ClientRequest {
        ClientRequest {
            id: self.id,
            method: self.method,
            url: self.url,
            headers: self.headers,
            cookies: self.cookies,
            attributes: self.attributes,
            body: self.body,
        }
    }
}
