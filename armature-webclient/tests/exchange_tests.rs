//! Integration tests for request exchange, status handling, filters, and
//! resource release, run against the in-memory connector.

use armature_webclient::*;
use futures::StreamExt;
use futures::channel::mpsc;
use parking_lot::Mutex;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_pending;

#[derive(Debug, thiserror::Error)]
#[error("user not found")]
struct UserNotFound;

#[derive(Debug, thiserror::Error)]
#[error("service down: {0}")]
struct ServiceDown(u16);

#[derive(Debug, Deserialize, PartialEq)]
struct Quote {
    symbol: String,
    price: f64,
}

fn client(mock: &MockConnector) -> WebClient {
    WebClient::builder()
        .base_url("http://mock.local")
        .connector(mock.clone())
        .build()
        .unwrap()
}

fn recorder(log: &Arc<Mutex<Vec<String>>>, name: &'static str) -> impl ExchangeFilter + 'static {
    let log = log.clone();
    filter_fn(move |request, next: Next| {
        log.lock().push(name.to_string());
        next.run(request)
    })
}

// =============================================================================
// Status Handling
// =============================================================================

#[tokio::test]
async fn test_error_status_without_handler() {
    let mock = MockConnector::new();
    mock.enqueue(
        MockResponse::new(StatusCode::NOT_FOUND)
            .header("content-type", "application/json")
            .body(r#"{"error":"missing"}"#),
    );

    let err = client(&mock)
        .get()
        .uri_with("/users/{id}", [9])
        .retrieve()
        .json::<serde_json::Value>()
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), Some(StatusCode::NOT_FOUND));
    let status = err.as_status_error().unwrap();
    assert_eq!(status.body_text(), r#"{"error":"missing"}"#);
    assert_eq!(status.method(), Some(&Method::GET));
    assert_eq!(
        err.to_string(),
        "404 Not Found from GET http://mock.local/users/9"
    );
    assert_eq!(mock.total_releases(), 1);
}

#[tokio::test]
async fn test_on_status_handler_error_is_returned() {
    let mock = MockConnector::new();
    mock.enqueue(MockResponse::new(StatusCode::NOT_FOUND).body("nope"));

    let err = client(&mock)
        .get()
        .uri("/users/1")
        .retrieve()
        .on_status(
            |s| s == StatusCode::NOT_FOUND,
            |_response| async { Err(WebClientError::custom(UserNotFound)) },
        )
        .text()
        .await
        .unwrap_err();

    assert!(err.downcast_custom::<UserNotFound>().is_some());
    assert_eq!(mock.total_releases(), 1);
}

#[tokio::test]
async fn test_on_status_handler_can_recover() {
    let mock = MockConnector::new();
    mock.enqueue(MockResponse::new(StatusCode::NOT_FOUND).body("nope"));

    let text = client(&mock)
        .get()
        .uri("/greeting")
        .retrieve()
        .on_status(
            |s| s.is_client_error(),
            |response| async move {
                Ok(response
                    .mutate()
                    .status(StatusCode::OK)
                    .body("fallback")
                    .build())
            },
        )
        .text()
        .await
        .unwrap();

    assert_eq!(text, "fallback");
    assert_eq!(mock.total_releases(), 1);
}

#[tokio::test]
async fn test_request_handlers_precede_default_handlers() {
    let mock = MockConnector::new();
    mock.respond_with(|_| MockResponse::new(StatusCode::SERVICE_UNAVAILABLE));
    let client = WebClient::builder()
        .base_url("http://mock.local")
        .connector(mock.clone())
        .default_status_handler(
            |s| s == StatusCode::SERVICE_UNAVAILABLE,
            |response| async move {
                Err(WebClientError::custom(ServiceDown(
                    response.status().as_u16(),
                )))
            },
        )
        .build()
        .unwrap();

    let err = client.get().uri("/a").retrieve().bytes().await.unwrap_err();
    assert_eq!(err.downcast_custom::<ServiceDown>().map(|e| e.0), Some(503));

    let err = client
        .get()
        .uri("/b")
        .retrieve()
        .on_status(
            |s| s.is_server_error(),
            |_| async { Err(WebClientError::custom(UserNotFound)) },
        )
        .bytes()
        .await
        .unwrap_err();
    assert!(err.downcast_custom::<UserNotFound>().is_some());
}

#[tokio::test]
async fn test_exchange_returns_error_statuses() {
    let mock = MockConnector::new();
    mock.enqueue(MockResponse::new(StatusCode::INTERNAL_SERVER_ERROR).body("boom"));

    let response = client(&mock).get().uri("/").exchange().await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.request().map(|r| r.method()), Some(&Method::GET));
    assert_eq!(response.text().await.unwrap(), "boom");
    assert_eq!(mock.total_releases(), 1);
}

#[tokio::test]
async fn test_to_entity() {
    let mock = MockConnector::new();
    mock.enqueue(
        MockResponse::new(StatusCode::CREATED)
            .header("location", "/quotes/1")
            .json(&serde_json::json!({"symbol": "ARM", "price": 1.5})),
    );
    mock.enqueue(MockResponse::new(StatusCode::ACCEPTED).body("ignored"));

    let entity = client(&mock)
        .post()
        .uri("/quotes")
        .json(&serde_json::json!({"symbol": "ARM"}))
        .retrieve()
        .to_entity::<Json<Quote>>()
        .await
        .unwrap();
    assert_eq!(entity.status(), StatusCode::CREATED);
    assert_eq!(entity.headers()["location"], "/quotes/1");
    assert_eq!(entity.into_body().map(|q| q.0.price), Some(1.5));

    let entity = client(&mock)
        .delete()
        .uri("/quotes/1")
        .retrieve()
        .to_bodiless_entity()
        .await
        .unwrap();
    assert_eq!(entity.status(), StatusCode::ACCEPTED);
    assert!(entity.body().is_none());
    assert_eq!(mock.total_releases(), 2);
}

// =============================================================================
// Release Exactly Once
// =============================================================================

#[tokio::test]
async fn test_release_when_response_discarded() {
    let mock = MockConnector::new();
    mock.enqueue(MockResponse::new(StatusCode::OK).body("unread"));

    let response = client(&mock).get().uri("/").exchange().await.unwrap();
    let id = response.request().unwrap().id();
    assert_eq!(mock.release_count(id), 0);
    drop(response);
    assert_eq!(mock.release_count(id), 1);
}

#[tokio::test]
async fn test_release_on_transport_failure() {
    let mock = MockConnector::new();
    mock.enqueue(MockResponse::error(ConnectError::new(
        ConnectErrorKind::Refused,
        "connection refused",
    )));

    let err = client(&mock).get().uri("/").retrieve().text().await.unwrap_err();
    assert!(err.is_connect());
    assert_eq!(mock.sent_count(), 1);
    let id = mock.requests()[0].id;
    assert_eq!(mock.release_count(id), 1);
}

#[tokio::test]
async fn test_release_when_stream_dropped_midway() {
    let mock = MockConnector::new();
    let (tx, rx) = mpsc::unbounded::<Result<Bytes>>();
    mock.enqueue(
        MockResponse::new(StatusCode::OK)
            .header("content-type", "text/plain")
            .stream(rx),
    );

    let mut lines = client(&mock).get().uri("/lines").retrieve().body_stream::<String>();
    tx.unbounded_send(Ok(Bytes::from_static(b"first\nsec"))).unwrap();
    assert_eq!(lines.next().await.unwrap().unwrap(), "first");
    assert_eq!(mock.total_releases(), 0);

    drop(lines);
    assert_eq!(mock.total_releases(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_release_when_pending_exchange_cancelled() {
    let mock = MockConnector::new();
    mock.enqueue(MockResponse::new(StatusCode::OK).delay(Duration::from_secs(30)));

    let mut pending = tokio_test::task::spawn(client(&mock).get().uri("/slow").retrieve().text());
    assert_pending!(pending.poll());
    assert_eq!(mock.sent_count(), 1);
    assert_eq!(mock.total_releases(), 0);

    drop(pending);
    let id = mock.requests()[0].id;
    assert_eq!(mock.release_count(id), 1);
}

#[tokio::test]
async fn test_release_after_buffer_limit() {
    let mock = MockConnector::new();
    mock.enqueue(MockResponse::new(StatusCode::OK).body("0123456789abcdef"));
    let client = client(&mock).mutate().max_in_memory_size(Some(8)).build().unwrap();

    let err = client.get().uri("/big").retrieve().text().await.unwrap_err();
    assert!(matches!(err, WebClientError::DataBufferLimit { limit: 8 }));
    assert_eq!(mock.total_releases(), 1);
}

#[tokio::test]
async fn test_release_after_unsupported_media_type() {
    let mock = MockConnector::new();
    mock.enqueue(
        MockResponse::new(StatusCode::OK)
            .header("content-type", "text/csv")
            .body("a,b"),
    );

    let err = client(&mock)
        .get()
        .uri("/report")
        .retrieve()
        .json::<serde_json::Value>()
        .await
        .unwrap_err();
    match err {
        WebClientError::UnsupportedMediaType { content_type, kind } => {
            assert_eq!(content_type, "text/csv");
            assert_eq!(kind, PayloadKind::Structured);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(mock.total_releases(), 1);
}

#[tokio::test]
async fn test_unsupported_media_type_checked_before_buffering() {
    let mock = MockConnector::new();
    mock.enqueue(
        MockResponse::new(StatusCode::OK)
            .header("content-type", "text/csv")
            .body("a,b,c,d,e,f,g,h,i"),
    );
    let client = client(&mock).mutate().max_in_memory_size(Some(8)).build().unwrap();

    let err = client
        .get()
        .uri("/report")
        .retrieve()
        .json::<serde_json::Value>()
        .await
        .unwrap_err();
    assert!(matches!(err, WebClientError::UnsupportedMediaType { .. }));
    assert_eq!(mock.total_releases(), 1);
}

#[tokio::test]
async fn test_error_body_truncated_to_buffer_limit() {
    let mock = MockConnector::new();
    mock.enqueue(MockResponse::new(StatusCode::INTERNAL_SERVER_ERROR).body("0123456789abcdef"));
    let client = client(&mock).mutate().max_in_memory_size(Some(8)).build().unwrap();

    let err = client.get().uri("/fail").retrieve().text().await.unwrap_err();
    let status = err.as_status_error().unwrap();
    assert_eq!(status.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(status.body_text(), "01234567");
    assert_eq!(mock.total_releases(), 1);
}

#[tokio::test]
async fn test_error_body_read_failure_is_returned() {
    let mock = MockConnector::new();
    let chunks = futures::stream::iter(vec![
        Ok(Bytes::from_static(b"partial")),
        Err(WebClientError::from(ConnectError::new(
            ConnectErrorKind::Body,
            "connection reset",
        ))),
    ]);
    mock.enqueue(MockResponse::new(StatusCode::BAD_GATEWAY).stream(chunks));

    let err = client(&mock).get().uri("/").retrieve().text().await.unwrap_err();
    assert!(err.is_connect());
    assert!(err.as_status_error().is_none());
    assert_eq!(mock.total_releases(), 1);
}

// =============================================================================
// Laziness and Streaming
// =============================================================================

#[tokio::test]
async fn test_nothing_sent_until_polled() {
    let mock = MockConnector::new();
    let client = client(&mock);

    let pending = client.get().uri("/").retrieve().text();
    let stream = client.get().uri("/").retrieve().body_stream::<Bytes>();
    assert_eq!(mock.sent_count(), 0);

    pending.await.unwrap();
    assert_eq!(mock.sent_count(), 1);
    drop(stream);
    assert_eq!(mock.sent_count(), 1);
}

#[tokio::test]
async fn test_server_sent_events_arrive_incrementally() {
    let mock = MockConnector::new();
    let (tx, rx) = mpsc::unbounded::<Result<Bytes>>();
    mock.enqueue(
        MockResponse::new(StatusCode::OK)
            .header("content-type", "text/event-stream")
            .stream(rx),
    );

    let mut events = client(&mock)
        .get()
        .uri("/events")
        .retrieve()
        .body_stream::<ServerSentEvent>();

    tx.unbounded_send(Ok(Bytes::from_static(b"id: 1\nevent: tick\ndata: one\n\n")))
        .unwrap();
    let first = events.next().await.unwrap().unwrap();
    assert_eq!(first.id.as_deref(), Some("1"));
    assert_eq!(first.data.as_deref(), Some("one"));

    {
        let mut next = tokio_test::task::spawn(events.next());
        assert_pending!(next.poll());
    }

    tx.unbounded_send(Ok(Bytes::from_static(b"data: tw"))).unwrap();
    tx.unbounded_send(Ok(Bytes::from_static(b"o\n\n"))).unwrap();
    drop(tx);
    let second = events.next().await.unwrap().unwrap();
    assert_eq!(second.data.as_deref(), Some("two"));
    assert!(events.next().await.is_none());
    assert_eq!(mock.total_releases(), 1);
}

#[tokio::test]
async fn test_json_array_streams_elements() {
    let mock = MockConnector::new();
    let chunks = futures::stream::iter(vec![
        Ok(Bytes::from_static(br#"[{"symbol":"A","price":1.0},"#)),
        Ok(Bytes::from_static(br#"{"symbol":"B","#)),
        Ok(Bytes::from_static(br#""price":2.5}]"#)),
    ]);
    mock.enqueue(
        MockResponse::new(StatusCode::OK)
            .header("content-type", "application/json")
            .stream(chunks),
    );

    let quotes: Vec<Quote> = client(&mock)
        .get()
        .uri("/quotes")
        .retrieve()
        .body_stream::<Json<Quote>>()
        .map(|q| q.unwrap().into_inner())
        .collect()
        .await;

    assert_eq!(
        quotes,
        vec![
            Quote { symbol: "A".into(), price: 1.0 },
            Quote { symbol: "B".into(), price: 2.5 },
        ]
    );
}

#[tokio::test]
async fn test_streaming_request_body() {
    let mock = MockConnector::new();
    client(&mock)
        .post()
        .uri("/ingest")
        .content_type(MediaType::APPLICATION_NDJSON)
        .body_stream(futures::stream::iter(vec![
            serde_json::json!({"n": 1}),
            serde_json::json!({"n": 2}),
        ]))
        .retrieve()
        .to_bodiless_entity()
        .await
        .unwrap();

    let request = &mock.requests()[0];
    assert_eq!(request.header("content-type"), Some("application/x-ndjson"));
    assert_eq!(request.body_text(), "{\"n\":1}\n{\"n\":2}\n");
}

// =============================================================================
// Filters and Client Configuration
// =============================================================================

#[tokio::test]
async fn test_filters_run_in_registration_order() {
    let mock = MockConnector::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    let client = WebClient::builder()
        .base_url("http://mock.local")
        .connector(mock.clone())
        .filter(recorder(&log, "A"))
        .filter(recorder(&log, "B"))
        .filter(filter_fn(|request: ClientRequest, next: Next| async move {
            let tenant = request.attribute("tenant").unwrap_or("none").to_string();
            let request = request
                .mutate()
                .header(
                    header::HeaderName::from_static("x-tenant"),
                    HeaderValue::from_str(&tenant).unwrap(),
                )
                .build();
            next.run(request).await
        }))
        .build()
        .unwrap();

    client
        .get()
        .uri("/")
        .attribute("tenant", "acme")
        .retrieve()
        .to_bodiless_entity()
        .await
        .unwrap();

    assert_eq!(*log.lock(), vec!["A", "B"]);
    assert_eq!(mock.requests()[0].header("x-tenant"), Some("acme"));
}

#[tokio::test]
async fn test_short_circuit_filter_skips_connector() {
    let mock = MockConnector::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    let client = WebClient::builder()
        .base_url("http://mock.local")
        .connector(mock.clone())
        .filter(recorder(&log, "A"))
        .filter(filter_fn(|_request, _next| async {
            Ok(ClientResponse::builder(StatusCode::OK).body("cached").build())
        }))
        .filter(recorder(&log, "C"))
        .build()
        .unwrap();

    let text = client.get().uri("/").retrieve().text().await.unwrap();
    assert_eq!(text, "cached");
    assert_eq!(*log.lock(), vec!["A"]);
    assert_eq!(mock.sent_count(), 0);
}

#[tokio::test]
async fn test_mutate_adds_filters_without_changing_original() {
    let mock = MockConnector::new();
    let log = Arc::new(Mutex::new(Vec::new()));
    let original = WebClient::builder()
        .base_url("http://mock.local")
        .connector(mock.clone())
        .filter(recorder(&log, "A"))
        .filter(recorder(&log, "B"))
        .build()
        .unwrap();
    let derived = original.mutate().filter(recorder(&log, "C")).build().unwrap();

    derived.get().uri("/").retrieve().bytes().await.unwrap();
    assert_eq!(*log.lock(), vec!["A", "B", "C"]);

    log.lock().clear();
    original.get().uri("/").retrieve().bytes().await.unwrap();
    assert_eq!(*log.lock(), vec!["A", "B"]);
    assert_eq!(original.filter_count(), 2);
    assert_eq!(derived.filter_count(), 3);
}

#[tokio::test]
async fn test_default_headers_and_cookies() {
    let mock = MockConnector::new();
    let client = WebClient::builder()
        .base_url("http://mock.local/api")
        .connector(mock.clone())
        .default_header("accept", "*/*")
        .default_header("x-client", "armature")
        .default_cookie("session", "s1")
        .default_cookie("theme", "light")
        .build()
        .unwrap();

    client
        .get()
        .uri("/profile")
        .header("accept", "application/json")
        .cookie("theme", "dark")
        .retrieve()
        .to_bodiless_entity()
        .await
        .unwrap();

    let request = &mock.requests()[0];
    assert_eq!(request.url.as_str(), "http://mock.local/api/profile");
    assert_eq!(request.header("accept"), Some("application/json"));
    assert_eq!(request.headers.get_all("accept").iter().count(), 1);
    assert_eq!(request.header("x-client"), Some("armature"));
    assert_eq!(request.cookies.as_deref(), Some("session=s1; theme=dark"));
}

#[tokio::test(start_paused = true)]
async fn test_auth_and_timeout_filters() {
    let mock = MockConnector::new();
    mock.enqueue(MockResponse::new(StatusCode::OK).delay(Duration::from_millis(200)));
    let client = client(&mock)
        .mutate()
        .filter(AuthFilter::bearer("secret"))
        .filter(TimeoutFilter::new(Duration::from_millis(20)))
        .build()
        .unwrap();

    let err = client.get().uri("/").retrieve().text().await.unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(mock.requests()[0].header("authorization"), Some("Bearer secret"));
    assert_eq!(mock.total_releases(), 1);
}
