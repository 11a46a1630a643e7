//! Pluggable transport.

mod mock;
mod reqwest_connector;

pub use mock::{MockConnector, MockResponse, RecordedRequest};
pub use reqwest_connector::ReqwestConnector;

use async_trait::async_trait;
use http::{HeaderMap, StatusCode};
use std::fmt;

use crate::body::BodyStream;
use crate::{ClientRequest, ExchangeId, Result};

/// Response head and lazy body produced by a connector.
pub struct ConnectorResponse {
    /// Response status.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Body, read on demand.
    pub body: BodyStream,
}

impl ConnectorResponse {
    /// Create a connector response.
    pub fn new(status: StatusCode, headers: HeaderMap, body: BodyStream) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }
}

impl fmt::Debug for ConnectorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectorResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Transport that sends requests and produces responses.
///
/// `release` is called exactly once for every `send`, after the response
/// body has been consumed or discarded, or after `send` failed or was
/// cancelled.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Send a request, pulling its body on demand.
    async fn send(&self, request: ClientRequest) -> Result<ConnectorResponse>;

    /// Release resources held for an exchange.
    fn release(&self, id: ExchangeId) {
        tracing::trace!(exchange = %id, "Released exchange");
    }
}
