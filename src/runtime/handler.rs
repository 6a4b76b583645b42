//! # HTTP Handler
//!
//! The function binary serves plain HTTP behind the Lambda Web Adapter:
//!
//! - `GET /` - ping the database, respond with the proxy-integration body
//! - `/healthz` - liveness (always 200)
//! - `/readyz` - 200 once the credential is resolved and the pinger built
//! - `/metrics` - Prometheus metrics in text format
//!
//! `GET /` admits one request at a time; while a ping is in flight further
//! requests get 429, mirroring a reserved concurrency of one.

use super::ping::DatabasePinger;
use crate::observability::metrics;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PingState {
    Success,
    Error,
    Throttled,
}

impl PingState {
    fn label(self) -> &'static str {
        match self {
            PingState::Success => "success",
            PingState::Error => "error",
            PingState::Throttled => "throttled",
        }
    }
}

/// Body of every `GET /` response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingResponse {
    pub state: PingState,
    /// `response from '<log stream>'`, identifying the instance that answered
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PingResponse {
    fn new(state: PingState, log_stream_name: &str) -> Self {
        Self {
            state,
            message: format!("response from '{log_stream_name}'"),
            latency_ms: None,
            error: None,
        }
    }
}

pub struct AppState {
    pinger: Arc<dyn DatabasePinger>,
    log_stream_name: String,
    in_flight: Option<Semaphore>,
    is_ready: AtomicBool,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("log_stream_name", &self.log_stream_name)
            .field("single_flight", &self.in_flight.is_some())
            .field("is_ready", &self.is_ready)
            .finish_non_exhaustive()
    }
}

impl AppState {
    pub fn new(
        pinger: Arc<dyn DatabasePinger>,
        log_stream_name: impl Into<String>,
        enforce_single_flight: bool,
    ) -> Self {
        Self {
            pinger,
            log_stream_name: log_stream_name.into(),
            in_flight: enforce_single_flight.then(|| Semaphore::new(1)),
            is_ready: AtomicBool::new(false),
        }
    }

    pub fn set_ready(&self, ready: bool) {
        self.is_ready.store(ready, Ordering::Relaxed);
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(ping_handler))
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn start_server(port: u16, state: Arc<AppState>) -> Result<(), anyhow::Error> {
    let app = router(state);

    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr).await?;

    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

async fn ping_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let _permit = match &state.in_flight {
        Some(semaphore) => match semaphore.try_acquire() {
            Ok(permit) => Some(permit),
            Err(_) => {
                warn!("Ping already in flight, throttling request");
                metrics::increment_pings_throttled();
                let body = PingResponse::new(PingState::Throttled, &state.log_stream_name);
                return (StatusCode::TOO_MANY_REQUESTS, Json(body));
            }
        },
        None => None,
    };

    let start = Instant::now();
    let result = state.pinger.ping().await;
    let elapsed = start.elapsed();

    let mut body = match result {
        Ok(latency) => {
            let mut body = PingResponse::new(PingState::Success, &state.log_stream_name);
            body.latency_ms = Some(latency.as_millis() as u64);
            body
        }
        Err(e) => {
            error!(error = %e, "Database ping failed");
            let mut body = PingResponse::new(PingState::Error, &state.log_stream_name);
            body.error = Some(e.to_string());
            body
        }
    };
    metrics::record_ping(body.state.label(), elapsed.as_secs_f64());
    if body.latency_ms.is_none() {
        body.latency_ms = Some(elapsed.as_millis() as u64);
    }
    info!(state = body.state.label(), latency_ms = body.latency_ms, "Ping handled");

    (StatusCode::OK, Json(body))
}

async fn metrics_handler() -> impl IntoResponse {
    match metrics::encode() {
        Ok(buffer) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {e}").into_bytes(),
            )
        }
    }
}

async fn healthz_handler() -> impl IntoResponse {
    StatusCode::OK
}

async fn readyz_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.is_ready.load(Ordering::Relaxed) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
