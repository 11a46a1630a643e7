//! WebClient facade.

use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use url::Url;

use crate::codec::CodecRegistry;
use crate::connector::{Connector, ReqwestConnector};
use crate::exchange::StatusHandler;
use crate::filter::{ExchangeFilter, ExchangeFunction};
use crate::{ClientResponse, RequestBuilder, Result, WebClientError, uri};

/// Immutable configuration shared by a client and its requests.
pub(crate) struct ClientConfig {
    base_url: Option<Url>,
    default_headers: HeaderMap,
    default_cookies: BTreeMap<String, Vec<String>>,
    default_uri_variables: HashMap<String, String>,
    connector: Arc<dyn Connector>,
    codecs: Arc<CodecRegistry>,
    filters: Vec<Arc<dyn ExchangeFilter>>,
    status_handlers: Vec<StatusHandler>,
    exchange: ExchangeFunction,
}

impl ClientConfig {
    pub(crate) fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    pub(crate) fn default_headers(&self) -> &HeaderMap {
        &self.default_headers
    }

    pub(crate) fn default_cookies(&self) -> &BTreeMap<String, Vec<String>> {
        &self.default_cookies
    }

    pub(crate) fn default_uri_variables(&self) -> &HashMap<String, String> {
        &self.default_uri_variables
    }

    pub(crate) fn codecs(&self) -> &Arc<CodecRegistry> {
        &self.codecs
    }

    pub(crate) fn status_handlers(&self) -> &[StatusHandler] {
        &self.status_handlers
    }

    pub(crate) fn exchange(&self) -> &ExchangeFunction {
        &self.exchange
    }
}

/// Non-blocking HTTP client.
///
/// The client holds only immutable configuration and is cheap to clone and
/// share across tasks. Use [`mutate`](Self::mutate) to derive a client with
/// different settings; the original is never changed.
#[derive(Clone)]
pub struct WebClient {
    config: Arc<ClientConfig>,
}

impl WebClient {
    /// Create a client with default settings and the reqwest connector.
    pub fn create() -> Self {
        WebClientBuilder::default().finish(None)
    }

    /// Create a client that resolves relative URIs against a base URL.
    pub fn create_with_base_url(base_url: impl AsRef<str>) -> Result<Self> {
        Self::builder().base_url(base_url.as_ref()).build()
    }

    /// Create a client builder.
    pub fn builder() -> WebClientBuilder {
        WebClientBuilder::default()
    }

    /// Start a builder pre-populated with a copy of this client's settings.
    pub fn mutate(&self) -> WebClientBuilder {
        let config = &self.config;
        WebClientBuilder {
            base_url: config.base_url.as_ref().map(Url::to_string),
            default_headers: config.default_headers.clone(),
            default_cookies: config.default_cookies.clone(),
            default_uri_variables: config.default_uri_variables.clone(),
            connector: Some(config.connector.clone()),
            codecs: config.codecs.as_ref().clone(),
            filters: config.filters.clone(),
            status_handlers: config.status_handlers.clone(),
            error: None,
        }
    }

    /// Base URL, if configured.
    pub fn base_url(&self) -> Option<&Url> {
        self.config.base_url()
    }

    /// Codecs used for request and response bodies.
    pub fn codecs(&self) -> &CodecRegistry {
        &self.config.codecs
    }

    /// Number of configured filters.
    pub fn filter_count(&self) -> usize {
        self.config.filters.len()
    }

    /// Start a GET request.
    pub fn get(&self) -> RequestBuilder {
        self.method(Method::GET)
    }

    /// Start a POST request.
    pub fn post(&self) -> RequestBuilder {
        self.method(Method::POST)
    }

    /// Start a PUT request.
    pub fn put(&self) -> RequestBuilder {
        self.method(Method::PUT)
    }

    /// Start a PATCH request.
    pub fn patch(&self) -> RequestBuilder {
        self.method(Method::PATCH)
    }

    /// Start a DELETE request.
    pub fn delete(&self) -> RequestBuilder {
        self.method(Method::DELETE)
    }

    /// Start a HEAD request.
    pub fn head(&self) -> RequestBuilder {
        self.method(Method::HEAD)
    }

    /// Start an OPTIONS request.
    pub fn options(&self) -> RequestBuilder {
        self.method(Method::OPTIONS)
    }

    /// Start a request with any method.
    pub fn method(&self, method: Method) -> RequestBuilder {
        RequestBuilder::new(self.config.clone(), method)
    }
}

impl Default for WebClient {
    fn default() -> Self {
        Self::create()
    }
}

impl fmt::Debug for WebClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebClient")
            .field("base_url", &self.config.base_url)
            .field("default_headers", &self.config.default_headers)
            .field("codecs", &self.config.codecs)
            .field("filters", &self.config.filters.len())
            .finish()
    }
}

/// Builder for a [`WebClient`].
#[derive(Default)]
pub struct WebClientBuilder {
    base_url: Option<String>,
    default_headers: HeaderMap,
    default_cookies: BTreeMap<String, Vec<String>>,
    default_uri_variables: HashMap<String, String>,
    connector: Option<Arc<dyn Connector>>,
    codecs: CodecRegistry,
    filters: Vec<Arc<dyn ExchangeFilter>>,
    status_handlers: Vec<StatusHandler>,
    error: Option<String>,
}

impl WebClientBuilder {
    /// Set the base URL for relative URIs.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Add a default header sent with every request.
    pub fn default_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        let name = name.as_ref();
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value.as_ref()),
        ) {
            (Ok(name), Ok(value)) => {
                self.default_headers.append(name, value);
            }
            _ => {
                if self.error.is_none() {
                    self.error = Some(format!("Invalid default header '{}'", name));
                }
            }
        }
        self
    }

    /// Manipulate the default headers.
    pub fn default_headers(mut self, f: impl FnOnce(&mut HeaderMap)) -> Self {
        f(&mut self.default_headers);
        self
    }

    /// Add a default cookie sent with every request.
    pub fn default_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_cookies
            .entry(name.into())
            .or_default()
            .push(value.into());
        self
    }

    /// Manipulate the default cookies.
    pub fn default_cookies(mut self, f: impl FnOnce(&mut BTreeMap<String, Vec<String>>)) -> Self {
        f(&mut self.default_cookies);
        self
    }

    /// Set default values for URI template variables.
    pub fn default_uri_variables<I, K, V>(mut self, variables: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: ToString,
    {
        self.default_uri_variables
            .extend(variables.into_iter().map(|(k, v)| (k.into(), v.to_string())));
        self
    }

    /// Set the connector. Defaults to [`ReqwestConnector`].
    pub fn connector<C: Connector>(mut self, connector: C) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    /// Configure the codecs.
    pub fn codecs(mut self, f: impl FnOnce(&mut CodecRegistry)) -> Self {
        f(&mut self.codecs);
        self
    }

    /// Set the in-memory buffering limit, `None` for unlimited.
    pub fn max_in_memory_size(mut self, limit: Option<usize>) -> Self {
        self.codecs.set_max_in_memory_size(limit);
        self
    }

    /// Append a filter; filters run in the order they are added.
    pub fn filter<F: ExchangeFilter + 'static>(mut self, filter: F) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    /// Manipulate the filter list.
    pub fn filters(mut self, f: impl FnOnce(&mut Vec<Arc<dyn ExchangeFilter>>)) -> Self {
        f(&mut self.filters);
        self
    }

    /// Add a status handler applied after any request-level handlers.
    pub fn default_status_handler<P, F, Fut>(mut self, predicate: P, handler: F) -> Self
    where
        P: Fn(StatusCode) -> bool + Send + Sync + 'static,
        F: Fn(ClientResponse) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ClientResponse>> + Send + 'static,
    {
        self.status_handlers
            .push(StatusHandler::new(predicate, handler));
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<WebClient> {
        if let Some(error) = &self.error {
            return Err(WebClientError::InvalidRequestState(error.clone()));
        }
        let base_url = self.base_url.as_deref().map(uri::parse_base).transpose()?;
        Ok(self.finish(base_url))
    }

    fn finish(self, base_url: Option<Url>) -> WebClient {
        let connector = self
            .connector
            .unwrap_or_else(|| Arc::new(ReqwestConnector::default()));
        let codecs = Arc::new(self.codecs);
        let exchange =
            ExchangeFunction::new(connector.clone(), codecs.clone(), self.filters.clone());

        WebClient {
            config: Arc::new(ClientConfig {
                base_url,
                default_headers: self.default_headers,
                default_cookies: self.default_cookies,
                default_uri_variables: self.default_uri_variables,
                connector,
                codecs,
                filters: self.filters,
                status_handlers: self.status_handlers,
                exchange,
            }),
        }
    }
}

impl fmt::Debug for WebClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebClientBuilder")
            .field("base_url", &self.base_url)
            .field("default_headers", &self.default_headers)
            .field("codecs", &self.codecs)
            .field("filters", &self.filters.len())
            .finish_non_exhaustive()
    }
}
