//! HTTP handler tests
//!
//! Drives the function's router in-process with scripted pingers.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use connection_pooling::observability::register_metrics;
use connection_pooling::runtime::{
    router, AppState, DatabasePinger, PingError, PingResponse, PingState,
};
use http_body_util::BodyExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tower::ServiceExt;

const LOG_STREAM: &str = "2026/10/19/[$LATEST]abc123";

struct FixedPinger(Result<Duration, fn() -> PingError>);

#[async_trait]
impl DatabasePinger for FixedPinger {
    async fn ping(&self) -> Result<Duration, PingError> {
        match &self.0 {
            Ok(latency) => Ok(*latency),
            Err(make) => Err(make()),
        }
    }
}

/// Blocks inside `ping` until released
#[derive(Default)]
struct GatedPinger {
    started: Notify,
    release: Notify,
}

#[async_trait]
impl DatabasePinger for GatedPinger {
    async fn ping(&self) -> Result<Duration, PingError> {
        self.started.notify_one();
        self.release.notified().await;
        Ok(Duration::from_millis(3))
    }
}

fn state(pinger: Arc<dyn DatabasePinger>, single_flight: bool) -> Arc<AppState> {
    Arc::new(AppState::new(pinger, LOG_STREAM, single_flight))
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("valid request")
}

async fn ping_body(response: axum::response::Response) -> PingResponse {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body readable")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("ping response is JSON")
}

#[tokio::test]
async fn test_successful_ping() {
    let app = router(state(
        Arc::new(FixedPinger(Ok(Duration::from_millis(7)))),
        true,
    ));

    let response = app.oneshot(get("/")).await.expect("request handled");
    assert_eq!(response.status(), StatusCode::OK);

    let body = ping_body(response).await;
    assert_eq!(body.state, PingState::Success);
    assert_eq!(body.message, format!("response from '{LOG_STREAM}'"));
    assert_eq!(body.latency_ms, Some(7));
    assert_eq!(body.error, None);
}

#[tokio::test]
async fn test_failed_ping_reports_error_state() {
    let app = router(state(
        Arc::new(FixedPinger(Err(|| {
            PingError::Connect("proxy refused the connection".into())
        }))),
        true,
    ));

    let response = app.oneshot(get("/")).await.expect("request handled");
    assert_eq!(response.status(), StatusCode::OK);

    let body = ping_body(response).await;
    assert_eq!(body.state, PingState::Error);
    let error = body.error.expect("error detail present");
    assert!(error.contains("proxy refused the connection"), "{error}");
}

#[tokio::test]
async fn test_concurrent_ping_is_throttled() {
    let pinger = Arc::new(GatedPinger::default());
    let app = router(state(pinger.clone(), true));

    let first = tokio::spawn(app.clone().oneshot(get("/")));
    pinger.started.notified().await;

    let second = app.clone().oneshot(get("/")).await.expect("request handled");
    assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
    let body = ping_body(second).await;
    assert_eq!(body.state, PingState::Throttled);
    assert_eq!(body.message, format!("response from '{LOG_STREAM}'"));

    pinger.release.notify_one();
    let first = first
        .await
        .expect("task joins")
        .expect("request handled");
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(ping_body(first).await.state, PingState::Success);

    // Permit is free again once the first ping returned
    let third = tokio::spawn(app.oneshot(get("/")));
    pinger.started.notified().await;
    pinger.release.notify_one();
    let third = third.await.expect("task joins").expect("request handled");
    assert_eq!(third.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_permit_released_after_ping() {
    let app = router(state(
        Arc::new(FixedPinger(Ok(Duration::from_millis(2)))),
        true,
    ));

    for _ in 0..3 {
        let response = app.clone().oneshot(get("/")).await.expect("request handled");
        assert_eq!(response.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn test_single_flight_can_be_disabled() {
    let pinger = Arc::new(GatedPinger::default());
    let app = router(state(pinger.clone(), false));

    let first = tokio::spawn(app.clone().oneshot(get("/")));
    pinger.started.notified().await;
    let second = tokio::spawn(app.clone().oneshot(get("/")));
    pinger.started.notified().await;

    pinger.release.notify_waiters();
    for handle in [first, second] {
        let response = handle.await.expect("task joins").expect("request handled");
        assert_eq!(response.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn test_health_and_readiness() {
    let state = state(Arc::new(FixedPinger(Ok(Duration::from_millis(1)))), true);
    let app = router(state.clone());

    let health = app.clone().oneshot(get("/healthz")).await.expect("handled");
    assert_eq!(health.status(), StatusCode::OK);

    let not_ready = app.clone().oneshot(get("/readyz")).await.expect("handled");
    assert_eq!(not_ready.status(), StatusCode::SERVICE_UNAVAILABLE);

    state.set_ready(true);
    let ready = app.oneshot(get("/readyz")).await.expect("handled");
    assert_eq!(ready.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    register_metrics().expect("metrics register");
    let app = router(state(Arc::new(FixedPinger(Ok(Duration::from_millis(1)))), true));

    let response = app.oneshot(get("/metrics")).await.expect("handled");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"],
        "text/plain; version=0.0.4; charset=utf-8"
    );
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body readable")
        .to_bytes();
    let text = String::from_utf8(bytes.to_vec()).expect("utf-8 metrics");
    assert!(text.contains("connection_pooling_pings_throttled_total"), "{text}");
}
