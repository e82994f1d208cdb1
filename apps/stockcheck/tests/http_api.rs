//! Display API Integration Tests
//!
//! Drives the router over a running offline session and a mock news backend.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use stockcheck::{
    ApiState, ConnectionState, FinnhubRestClient, FinnhubStream, InMemoryWatchlist,
    MockFeedConfig, NewsClient, RestConfig, SessionHandle, SessionPorts, SessionSettings,
    StreamConfig, WatchlistSession, router,
};

fn spawn_session(cancel: &CancellationToken) -> SessionHandle {
    let stream = StreamConfig {
        url: "wss://unused.invalid".to_string(),
        token: None,
        open_timeout: Duration::from_secs(5),
        mock: MockFeedConfig::with_interval(Duration::from_millis(50)),
    };
    let rest = RestConfig {
        base_url: "http://127.0.0.1:9".to_string(),
        token: None,
        timeout: Duration::from_secs(1),
    };
    let ports = SessionPorts {
        stream: Arc::new(FinnhubStream::new(stream)),
        quotes: Arc::new(FinnhubRestClient::new(rest).unwrap()),
        persistence: Arc::new(InMemoryWatchlist::new()),
    };
    let (handle, _task) = WatchlistSession::spawn(ports, SessionSettings::default(), cancel.clone());
    handle
}

async fn body_json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn get(app: &axum::Router, uri: &str) -> Response {
    app.clone()
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

#[tokio::test]
async fn quote_reflects_live_session() {
    let cancel = CancellationToken::new();
    let handle = spawn_session(&cancel);

    let mut rx = handle.subscribe();
    tokio::time::timeout(
        Duration::from_secs(5),
        rx.wait_for(|s| s.connection == ConnectionState::Mock && s.quote.is_some()),
    )
    .await
    .unwrap()
    .unwrap();

    let app = router(Arc::new(ApiState::new("test".to_string(), handle.clone(), None)));

    let response = get(&app, "/api/quote").await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["connection"], "mock");
    assert_eq!(json["selected"], "META");
    assert_eq!(json["quote"]["source"], "stream");
    assert!(json["error"].is_null());

    let response = get(&app, "/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "healthy");

    let response = app
        .clone()
        .oneshot(
            Request::put("/api/selection")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"symbol":"googl"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    tokio::time::timeout(
        Duration::from_secs(5),
        rx.wait_for(|s| s.selected.as_ref().is_some_and(|sym| sym.as_str() == "GOOGL")),
    )
    .await
    .unwrap()
    .unwrap();

    let json = body_json(get(&app, "/api/watchlist").await).await;
    assert_eq!(json["selected"], "GOOGL");
    assert_eq!(json["symbols"], json!(["META", "AAPL", "GOOGL"]));

    cancel.cancel();
}

#[tokio::test]
async fn news_is_proxied() {
    let news_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/news"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"title": "Rates hold", "source": "Wire", "url": "https://example.com/r", "published": "2026-10-19T12:00:00Z"}
        ])))
        .mount(&news_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/news/signal"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&news_server)
        .await;

    let cancel = CancellationToken::new();
    let news = NewsClient::new(news_server.uri(), Duration::from_secs(2)).unwrap();
    let app = router(Arc::new(ApiState::new(
        "test".to_string(),
        spawn_session(&cancel),
        Some(news),
    )));

    let response = get(&app, "/api/news").await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json[0]["title"], "Rates hold");

    let response = app
        .clone()
        .oneshot(
            Request::post("/api/news/signal")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_json(response).await["error"], "signal failed 500");

    cancel.cancel();
}
