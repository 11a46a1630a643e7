//! Exchange filter chain.

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;

use crate::codec::CodecRegistry;
use crate::connector::Connector;
use crate::{ClientRequest, ClientResponse, Result, exchange};

/// Filter wrapped around the exchange.
///
/// Filters run in registration order, the first registered being the
/// outermost. A filter may modify the request before calling `next`,
/// transform the response it gets back, or return its own response without
/// calling `next` at all.
#[async_trait]
pub trait ExchangeFilter: Send + Sync {
    /// Process the request and call the next filter.
    async fn filter(&self, request: ClientRequest, next: Next) -> Result<ClientResponse>;
}

struct Chain {
    connector: Arc<dyn Connector>,
    codecs: Arc<CodecRegistry>,
    filters: Vec<Arc<dyn ExchangeFilter>>,
}

/// Remainder of the chain after the current filter.
#[derive(Clone)]
pub struct Next {
    chain: Arc<Chain>,
    index: usize,
}

impl Next {
    /// Continue with the next filter, or the connector at the end of the chain.
    pub fn run(self, request: ClientRequest) -> BoxFuture<'static, Result<ClientResponse>> {
        Box::pin(async move {
            match self.chain.filters.get(self.index).cloned() {
                Some(filter) => {
                    let next = Next {
                        chain: self.chain.clone(),
                        index: self.index + 1,
                    };
                    filter.filter(request, next).await
                }
                None => {
                    exchange::send(
                        self.chain.connector.clone(),
                        self.chain.codecs.clone(),
                        request,
                    )
                    .await
                }
            }
        })
    }
}

/// Filters composed around a connector.
#[derive(Clone)]
pub struct ExchangeFunction {
    chain: Arc<Chain>,
}

impl ExchangeFunction {
    /// Compose filters around a connector.
    pub fn new(
        connector: Arc<dyn Connector>,
        codecs: Arc<CodecRegistry>,
        filters: Vec<Arc<dyn ExchangeFilter>>,
    ) -> Self {
        Self {
            chain: Arc::new(Chain {
                connector,
                codecs,
                filters,
            }),
        }
    }

    /// Run a request through the filters and the connector.
    pub fn exchange(&self, request: ClientRequest) -> BoxFuture<'static, Result<ClientResponse>> {
        Next {
            chain: self.chain.clone(),
            index: 0,
        }
        .run(request)
    }

    /// Number of filters.
    pub fn filter_count(&self) -> usize {
        self.chain.filters.len()
    }
}

/// Filter from an async closure over the request and the chain.
pub struct FilterFn<F>(F);

/// Create a filter from an async closure.
pub fn filter_fn<F, Fut>(f: F) -> FilterFn<F>
where
    F: Fn(ClientRequest, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ClientResponse>> + Send + 'static,
{
    FilterFn(f)
}

#[async_trait]
impl<F, Fut> ExchangeFilter for FilterFn<F>
where
    F: Fn(ClientRequest, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ClientResponse>> + Send + 'static,
{
    async fn filter(&self, request: ClientRequest, next: Next) -> Result<ClientResponse> {
        (self.0)(request, next).await
    }
}

/// Filter transforming the request only.
pub struct RequestProcessor<F>(F);

/// Create a filter that rewrites each request before it continues.
pub fn request_processor<F, Fut>(f: F) -> RequestProcessor<F>
where
    F: Fn(ClientRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ClientRequest>> + Send + 'static,
{
    RequestProcessor(f)
}

#[async_trait]
impl<F, Fut> ExchangeFilter for RequestProcessor<F>
where
    F: Fn(ClientRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ClientRequest>> + Send + 'static,
{
    async fn filter(&self, request: ClientRequest, next: Next) -> Result<ClientResponse> {
        let request = (self.0)(request).await?;
        next.run(request).await
    }
}

/// Filter transforming the response only.
pub struct ResponseProcessor<F>(F);

/// Create a filter that rewrites each response on its way back.
pub fn response_processor<F, Fut>(f: F) -> ResponseProcessor<F>
where
    F: Fn(ClientResponse) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ClientResponse>> + Send + 'static,
{
    ResponseProcessor(f)
}

#[async_trait]
impl<F, Fut> ExchangeFilter for ResponseProcessor<F>
where
    F: Fn(ClientResponse) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<ClientResponse>> + Send + 'static,
{
    async fn filter(&self, request: ClientRequest, next: Next) -> Result<ClientResponse> {
        let response = next.run(request).await?;
        (self.0)(response).await
    }
}
