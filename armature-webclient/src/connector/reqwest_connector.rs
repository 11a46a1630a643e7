//! Connector backed by `reqwest`.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use http::header::COOKIE;
use parking_lot::Mutex;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::{trace, warn};

use super::{Connector, ConnectorResponse};
use crate::body::BodyStream;
use crate::{Body, ClientRequest, ConnectorConfig, ExchangeId, Result, WebClientError};

/// Default connector using a pooled `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestConnector {
    client: reqwest::Client,
}

impl ReqwestConnector {
    /// Create a connector with default configuration.
    pub fn new() -> Result<Self> {
        Self::with_config(&ConnectorConfig::default())
    }

    /// Create a connector with the given configuration.
    pub fn with_config(config: &ConnectorConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(config.pool_idle_timeout)
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .user_agent(&config.user_agent)
            .gzip(config.gzip)
            .brotli(config.brotli);

        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        if config.follow_redirects {
            builder = builder.redirect(reqwest::redirect::Policy::limited(config.max_redirects));
        } else {
            builder = builder.redirect(reqwest::redirect::Policy::none());
        }

        Ok(Self {
            client: builder.build()?,
        })
    }

    /// Wrap an existing client.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Get the underlying reqwest client.
    pub fn inner(&self) -> &reqwest::Client {
        &self.client
    }
}

impl Default for ReqwestConnector {
    fn default() -> Self {
        Self::new().unwrap_or_else(|e| {
            warn!(error = %e, "Falling back to an unconfigured reqwest client");
            Self::from_client(reqwest::Client::new())
        })
    }
}

#[async_trait]
impl Connector for ReqwestConnector {
    async fn send(&self, request: ClientRequest) -> Result<ConnectorResponse> {
        let mut builder = self
            .client
            .request(request.method().clone(), request.url().clone())
            .headers(request.headers().clone());

        if let Some(cookies) = request.cookie_header() {
            builder = builder.header(COOKIE, cookies);
        }

        builder = match request.into_body() {
            Body::Empty => builder,
            Body::Bytes(bytes) => builder.body(bytes),
            body @ Body::Stream(_) => {
                let stream = SyncStream(Mutex::new(body.into_stream()?));
                builder.body(reqwest::Body::wrap_stream(stream))
            }
        };

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(WebClientError::from))
            .boxed();

        Ok(ConnectorResponse::new(status, headers, body))
    }

    fn release(&self, id: ExchangeId) {
        trace!(exchange = %id, "Released reqwest exchange");
    }
}

/// Gives a request body stream the `Sync` bound reqwest asks for; the
/// stream is only ever polled through `&mut`.
struct SyncStream(Mutex<BodyStream>);

impl Stream for SyncStream {
    type Item = Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().0.get_mut().as_mut().poll_next(cx)
    }
}
