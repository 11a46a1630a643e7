//! # Armature WebClient
//!
//! A non-blocking HTTP client with a fluent request builder, pluggable
//! transport and codecs, and a composable filter chain.
//!
//! ## Features
//!
//! - **Lazy exchanges**: nothing is sent until the returned future or stream is polled
//! - **Streaming bodies**: JSON arrays, NDJSON, server-sent events, and text lines
//!   decoded incrementally
//! - **Codecs**: content-type driven encoding and decoding with custom codec support
//! - **Filters**: ordered interceptors for auth, logging, timeouts, and more
//! - **Connectors**: reqwest by default, or an in-memory mock for tests
//! - **Status handling**: `retrieve` maps 4xx/5xx to errors unless a handler applies
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use armature_webclient::WebClient;
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct User {
//!     name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = WebClient::create_with_base_url("https://api.example.com")?;
//!
//!     let user: User = client
//!         .get()
//!         .uri_with("/users/{id}", [42])
//!         .retrieve()
//!         .json()
//!         .await?;
//!
//!     println!("Hello, {}", user.name);
//!     Ok(())
//! }
//! ```
//!
//! ## Filters and Status Handlers
//!
//! ```rust,no_run
//! use armature_webclient::{AuthFilter, LoggingFilter, StatusCode, WebClient, WebClientError};
//! use std::time::Duration;
//!
//! #[derive(Debug, thiserror::Error)]
//! #[error("order not found")]
//! struct OrderNotFound;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = WebClient::builder()
//!         .base_url("https://api.example.com")
//!         .filter(LoggingFilter::new())
//!         .filter(AuthFilter::bearer("token"))
//!         .build()?;
//!
//!     let order = client
//!         .get()
//!         .uri("/orders/7")
//!         .retrieve()
//!         .on_status(
//!             |status| status == StatusCode::NOT_FOUND,
//!             |_response| async { Err(WebClientError::custom(OrderNotFound)) },
//!         )
//!         .text()
//!         .await;
//!
//!     if let Err(e) = order {
//!         assert!(e.downcast_custom::<OrderNotFound>().is_some());
//!     }
//!     Ok(())
//! }
//! ```

mod body;
mod client;
mod client_request;
mod codec;
mod config;
mod connector;
mod cookie;
mod error;
mod exchange;
mod filter;
mod filters;
mod media;
mod request;
mod response;
mod uri;

pub use body::{Body, BodyStream, OneShotStream};
pub use client::{WebClient, WebClientBuilder};
pub use client_request::{ClientRequest, ClientRequestBuilder, ExchangeId};
pub use codec::{
    BytesCodec, Codec, CodecRegistry, DEFAULT_MAX_IN_MEMORY_SIZE, FormCodec, FromPayload,
    IntoPayload, Json, JsonCodec, Payload, PayloadKind, PayloadStream, ServerSentEvent, SseCodec,
    StringCodec,
};
pub use config::{ConnectorConfig, ConnectorConfigBuilder};
pub use connector::{
    Connector, ConnectorResponse, MockConnector, MockResponse, RecordedRequest, ReqwestConnector,
};
pub use cookie::ResponseCookie;
pub use error::{ConnectError, ConnectErrorKind, ResponseStatusError, Result, WebClientError};
pub use exchange::{ResponseSpec, StatusHandler};
pub use filter::{
    ExchangeFilter, ExchangeFunction, FilterFn, Next, RequestProcessor, ResponseProcessor,
    filter_fn, request_processor, response_processor,
};
pub use filters::{
    AuthFilter, LimitResponseSizeFilter, LoggingFilter, StatusErrorFilter, TimeoutFilter,
};
pub use media::MediaType;
pub use request::RequestBuilder;
pub use response::{
    ClientResponse, ClientResponseBuilder, RequestInfo, ResponseEntity, ResponseStream,
};

// Re-export common types
pub use bytes::Bytes;
pub use http::{HeaderMap, HeaderValue, Method, StatusCode, header};
pub use url::Url;

/// Body helpers for custom connectors and codecs.
pub mod util {
    pub use crate::body::{collect_limited, once};
}

/// Prelude for common imports.
///
/// ```
/// use armature_webclient::prelude::*;
/// ```
pub mod prelude {
    pub use crate::client::{WebClient, WebClientBuilder};
    pub use crate::codec::{Json, ServerSentEvent};
    pub use crate::error::{Result, WebClientError};
    pub use crate::exchange::ResponseSpec;
    pub use crate::filter::{ExchangeFilter, Next, filter_fn};
    pub use crate::filters::{AuthFilter, LoggingFilter, TimeoutFilter};
    pub use crate::media::MediaType;
    pub use crate::request::RequestBuilder;
    pub use crate::response::{ClientResponse, ResponseEntity};
    pub use futures::StreamExt;
    pub use http::{HeaderMap, HeaderValue, Method, StatusCode, header};
}
