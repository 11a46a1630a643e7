//! Request builder.

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use http::header::{ACCEPT, CONTENT_TYPE};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;

use crate::client::ClientConfig;
use crate::codec::{IntoPayload, Payload, PayloadKind, PayloadStream};
use crate::exchange::ResponseSpec;
use crate::uri::{self, UriVariables};
use crate::{Body, ClientRequest, ClientResponse, MediaType, Result, WebClientError};

type PayloadSource = Arc<Mutex<Option<PayloadStream>>>;

#[derive(Debug, Clone)]
enum Deferred {
    InvalidRequestState(String),
    Codec(String),
}

impl From<&Deferred> for WebClientError {
    fn from(deferred: &Deferred) -> Self {
        match deferred {
            Deferred::InvalidRequestState(msg) => WebClientError::InvalidRequestState(msg.clone()),
            Deferred::Codec(msg) => WebClientError::Codec(msg.clone()),
        }
    }
}

/// Fluent builder for a request.
///
/// Setter errors are kept and reported by [`build`](Self::build), so chains
/// never break midway. Nothing is sent until the future returned by a
/// terminal method is polled.
#[derive(Clone)]
pub struct RequestBuilder {
    config: Arc<ClientConfig>,
    method: Method,
    uri: Option<(String, UriVariables)>,
    query: Vec<(String, String)>,
    headers: HeaderMap,
    cookies: BTreeMap<String, Vec<String>>,
    attributes: HashMap<String, String>,
    value: Option<Payload>,
    stream: Option<(PayloadSource, PayloadKind)>,
    error: Option<Deferred>,
}

impl RequestBuilder {
    pub(crate) fn new(config: Arc<ClientConfig>, method: Method) -> Self {
        Self {
            config,
            method,
            uri: None,
            query: Vec::new(),
            headers: HeaderMap::new(),
            cookies: BTreeMap::new(),
            attributes: HashMap::new(),
            value: None,
            stream: None,
            error: None,
        }
    }

    pub(crate) fn config(&self) -> &Arc<ClientConfig> {
        &self.config
    }

    fn fail(&mut self, error: Deferred) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    /// Set the URI. Template variables resolve from the client's default
    /// URI variables.
    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some((uri.into(), UriVariables::None));
        self
    }

    /// Set a URI template with values for its variables in order of
    /// occurrence.
    pub fn uri_with<I, V>(mut self, template: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: ToString,
    {
        let values = values.into_iter().map(|v| v.to_string()).collect();
        self.uri = Some((template.into(), UriVariables::Positional(values)));
        self
    }

    /// Set a URI template with values for its variables by name.
    pub fn uri_with_map<I, K, V>(mut self, template: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        let values = values
            .into_iter()
            .map(|(k, v)| (k.into(), v.to_string()))
            .collect();
        self.uri = Some((template.into(), UriVariables::Named(values)));
        self
    }

    /// Add a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Add a header value. Request headers replace client defaults of the
    /// same name.
    pub fn header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        let name = name.as_ref();
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value.as_ref()),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            (Err(e), _) => self.fail(Deferred::InvalidRequestState(format!(
                "Invalid header name '{}': {}",
                name, e
            ))),
            (_, Err(e)) => self.fail(Deferred::InvalidRequestState(format!(
                "Invalid value for header '{}': {}",
                name, e
            ))),
        }
        self
    }

    /// Manipulate the request headers.
    pub fn headers(mut self, f: impl FnOnce(&mut HeaderMap)) -> Self {
        f(&mut self.headers);
        self
    }

    /// Add an acceptable media type.
    pub fn accept(mut self, media: MediaType) -> Self {
        match media.to_header_value() {
            Ok(value) => {
                self.headers.append(ACCEPT, value);
            }
            Err(e) => self.fail(Deferred::InvalidRequestState(e.to_string())),
        }
        self
    }

    /// Declare the body content type, which drives encoder selection.
    pub fn content_type(mut self, media: MediaType) -> Self {
        match media.to_header_value() {
            Ok(value) => {
                self.headers.insert(CONTENT_TYPE, value);
            }
            Err(e) => self.fail(Deferred::InvalidRequestState(e.to_string())),
        }
        self
    }

    /// Add a cookie value. Request cookies replace client defaults of the
    /// same name.
    pub fn cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies
            .entry(name.into())
            .or_default()
            .push(value.into());
        self
    }

    /// Manipulate the request cookies.
    pub fn cookies(mut self, f: impl FnOnce(&mut BTreeMap<String, Vec<String>>)) -> Self {
        f(&mut self.cookies);
        self
    }

    /// Set an attribute for filters. Attributes are never sent.
    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Set the body to a single value, encoded when the request is built.
    pub fn body_value<T: IntoPayload>(mut self, value: T) -> Self {
        match value.into_payload() {
            Ok(payload) => self.value = Some(payload),
            Err(e) => self.fail(Deferred::Codec(e.to_string())),
        }
        self
    }

    /// Set a JSON body.
    pub fn json<T: Serialize + ?Sized>(mut self, value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(value) => self.value = Some(Payload::Structured(value)),
            Err(e) => self.fail(Deferred::Codec(e.to_string())),
        }
        self
    }

    /// Set a URL-encoded form body from a flat serializable value.
    pub fn form<T: Serialize + ?Sized>(self, value: &T) -> Self {
        self.content_type(MediaType::APPLICATION_FORM_URLENCODED)
            .json(value)
    }

    /// Set a text body.
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.value = Some(Payload::Text(text.into()));
        self
    }

    /// Set a raw byte body.
    pub fn bytes(mut self, bytes: impl Into<Bytes>) -> Self {
        self.value = Some(Payload::Bytes(bytes.into()));
        self
    }

    /// Set a streaming body. Items are encoded one at a time as the
    /// connector pulls the body.
    pub fn body_stream<S, T>(mut self, items: S) -> Self
    where
        S: Stream<Item = T> + Send + 'static,
        T: IntoPayload,
    {
        let payloads: PayloadStream = items.map(IntoPayload::into_payload).boxed();
        self.stream = Some((Arc::new(Mutex::new(Some(payloads))), T::kind()));
        self
    }

    /// Freeze the builder into a request.
    ///
    /// Merges client defaults, expands and resolves the URI, and selects the
    /// body encoder. Building again yields an independent request with a
    /// new exchange id; a streaming body can still be sent only once.
    pub fn build(&self) -> Result<ClientRequest> {
        if let Some(error) = &self.error {
            return Err(error.into());
        }
        if self.value.is_some() && self.stream.is_some() {
            return Err(WebClientError::InvalidRequestState(
                "Both a body value and a body stream were set".to_string(),
            ));
        }

        let url = self.resolve_url()?;
        let mut headers = self.merged_headers();
        let mut cookies = self.config.default_cookies().clone();
        for (name, values) in &self.cookies {
            cookies.insert(name.clone(), values.clone());
        }

        let declared = headers
            .get(CONTENT_TYPE)
            .map(MediaType::from_header)
            .transpose()?;
        let codecs = self.config.codecs();
        let (body, content_type) = if let Some(payload) = &self.value {
            let (bytes, content_type) = codecs.encode(payload.clone(), declared.as_ref())?;
            (Body::Bytes(bytes), Some(content_type))
        } else if let Some((source, kind)) = &self.stream {
            let (stream, content_type) =
                codecs.encode_stream(take_once(source.clone()), declared.as_ref(), *kind)?;
            (Body::from_stream(stream), Some(content_type))
        } else {
            (Body::Empty, None)
        };
        if let Some(content_type) = content_type
            && declared.is_none()
        {
            headers.insert(CONTENT_TYPE, content_type.to_header_value()?);
        }

        let mut request = ClientRequest::builder(self.method.clone(), url)
            .headers(|h| *h = headers)
            .cookies(|c| *c = cookies)
            .body(body);
        for (name, value) in &self.attributes {
            request = request.attribute(name.clone(), value.clone());
        }
        Ok(request.build())
    }

    fn resolve_url(&self) -> Result<url::Url> {
        let mut url = match &self.uri {
            Some((template, variables)) => {
                let expanded =
                    uri::expand(template, variables, self.config.default_uri_variables())?;
                uri::resolve(self.config.base_url(), &expanded)?
            }
            None => self
                .config
                .base_url()
                .cloned()
                .ok_or_else(|| WebClientError::InvalidUri("No URI set".to_string()))?,
        };
        uri::append_query(&mut url, &self.query);
        Ok(url)
    }

    fn merged_headers(&self) -> HeaderMap {
        let mut headers = self.config.default_headers().clone();
        for name in self.headers.keys() {
            headers.remove(name);
        }
        for (name, value) in &self.headers {
            headers.append(name.clone(), value.clone());
        }
        headers
    }

    /// Declare how the response is handled; 4xx and 5xx statuses become
    /// errors unless a status handler applies.
    pub fn retrieve(self) -> ResponseSpec {
        ResponseSpec::new(self)
    }

    /// Exchange and return the response regardless of its status.
    pub async fn exchange(self) -> Result<ClientResponse> {
        let request = self.build()?;
        self.config.exchange().exchange(request).await
    }

    /// Exchange and map the response with a closure. Whatever part of the
    /// response the closure leaves unconsumed is released.
    pub async fn exchange_to<F, Fut, R>(self, f: F) -> Result<R>
    where
        F: FnOnce(ClientResponse) -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        let response = self.exchange().await?;
        f(response).await
    }
}

/// Forward a shared payload stream to the first subscriber.
fn take_once(source: PayloadSource) -> PayloadStream {
    stream::once(async move { source.lock().take() })
        .flat_map(|taken| match taken {
            Some(payloads) => payloads,
            None => stream::once(async {
                Err(WebClientError::InvalidRequestState(
                    "Request body stream has already been consumed".to_string(),
                ))
            })
            .boxed(),
        })
        .boxed()
}
