//! Display API and Health Endpoints
//!
//! HTTP surface over the watchlist session: snapshot reads, watchlist
//! commands, the news proxy, health checks, and Prometheus metrics.
//!
//! # Endpoints
//!
//! - `GET /health` - JSON health status
//! - `GET /healthz` - Liveness probe (simple OK)
//! - `GET /metrics` - Prometheus metrics in text format
//! - `GET /api/quote` - Current session snapshot
//! - `GET /api/watchlist` - Symbols, selection, and sidebar prices
//! - `POST /api/watchlist` - Add and select a symbol
//! - `DELETE /api/watchlist/{symbol}` - Remove a symbol
//! - `PUT /api/selection` - Select a tracked symbol
//! - `GET /api/news` - Latest headlines
//! - `POST /api/news/signal` - Trading signal from the news

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::services::{SessionClosed, SessionHandle, SidebarEntry};
use crate::domain::quote::ConnectionState;
use crate::domain::watchlist::Symbol;
use crate::infrastructure::metrics::get_metrics_handle;
use crate::infrastructure::news::NewsClient;

// =============================================================================
// Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Service version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Price stream connection state.
    pub connection: ConnectionState,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Prices are flowing from the stream or the synthetic feed.
    Healthy,
    /// No live prices right now, but nothing has failed.
    Degraded,
    /// The price stream failed.
    Unhealthy,
}

impl HealthStatus {
    const fn from_connection(state: ConnectionState) -> Self {
        match state {
            ConnectionState::Open | ConnectionState::Mock => Self::Healthy,
            ConnectionState::Idle | ConnectionState::Connecting | ConnectionState::Closed => {
                Self::Degraded
            }
            ConnectionState::Error => Self::Unhealthy,
        }
    }
}

/// Watchlist view.
#[derive(Debug, Clone, Serialize)]
pub struct WatchlistResponse {
    /// Tracked symbols in order.
    pub symbols: Vec<Symbol>,
    /// Selected symbol.
    pub selected: Option<Symbol>,
    /// Sidebar rows in watchlist order.
    pub sidebar: Vec<SidebarEntry>,
    /// Sidebar error.
    pub sidebar_error: Option<String>,
}

/// Error body.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Human-readable message.
    pub error: String,
}

/// Request body naming a symbol.
#[derive(Debug, Clone, Deserialize)]
pub struct SymbolRequest {
    /// Raw ticker input. Normalized by the session.
    pub symbol: String,
}

// =============================================================================
// Server State
// =============================================================================

/// Shared state for the API server.
pub struct ApiState {
    version: String,
    started_at: Instant,
    session: SessionHandle,
    news: Option<NewsClient>,
}

impl ApiState {
    /// Create new API state.
    #[must_use]
    pub fn new(version: String, session: SessionHandle, news: Option<NewsClient>) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            session,
            news,
        }
    }
}

// =============================================================================
// Server
// =============================================================================

/// Build the API router.
#[must_use]
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/metrics", get(metrics_handler))
        .route("/api/quote", get(quote_handler))
        .route("/api/watchlist", get(watchlist_handler).post(add_handler))
        .route("/api/watchlist/{symbol}", delete(remove_handler))
        .route("/api/selection", put(select_handler))
        .route("/api/news", get(news_handler))
        .route("/api/news/signal", post(signal_handler))
        .with_state(state)
}

/// API HTTP server.
pub struct ApiServer {
    port: u16,
    state: Arc<ApiState>,
    cancel: CancellationToken,
}

impl ApiServer {
    /// Create a new API server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<ApiState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HttpServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HttpServerError> {
        let app = router(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HttpServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "API server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HttpServerError::ServerFailed(e.to_string()))?;

        tracing::info!("API server stopped");
        Ok(())
    }
}

// =============================================================================
// Health Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let connection = state.session.snapshot().connection;
    let response = HealthResponse {
        status: HealthStatus::from_connection(connection),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        connection,
    };
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                handle.render(),
            )
        },
    )
}

// =============================================================================
// Session Handlers
// =============================================================================

async fn quote_handler(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    Json(state.session.snapshot())
}

async fn watchlist_handler(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    let snapshot = state.session.snapshot();
    Json(WatchlistResponse {
        symbols: snapshot.watchlist,
        selected: snapshot.selected,
        sidebar: snapshot.sidebar,
        sidebar_error: snapshot.sidebar_error,
    })
}

async fn add_handler(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<SymbolRequest>,
) -> Response {
    accepted(state.session.add(body.symbol).await)
}

async fn remove_handler(
    State(state): State<Arc<ApiState>>,
    Path(symbol): Path<String>,
) -> Response {
    accepted(state.session.remove(symbol).await)
}

async fn select_handler(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<SymbolRequest>,
) -> Response {
    accepted(state.session.select(body.symbol).await)
}

fn accepted(result: Result<(), SessionClosed>) -> Response {
    match result {
        Ok(()) => StatusCode::ACCEPTED.into_response(),
        Err(e) => error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
    }
}

// =============================================================================
// News Handlers
// =============================================================================

const NEWS_DISABLED: &str = "news backend not configured";

async fn news_handler(State(state): State<Arc<ApiState>>) -> Response {
    let Some(news) = &state.news else {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, NEWS_DISABLED);
    };

    match news.headlines().await {
        Ok(headlines) => Json(headlines).into_response(),
        Err(e) => error_response(StatusCode::BAD_GATEWAY, e.to_string()),
    }
}

async fn signal_handler(State(state): State<Arc<ApiState>>) -> Response {
    let Some(news) = &state.news else {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, NEWS_DISABLED);
    };

    match news.signal().await {
        Ok(signal) => Json(signal).into_response(),
        Err(e) => error_response(StatusCode::BAD_GATEWAY, e.to_string()),
    }
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

// =============================================================================
// Errors
// =============================================================================

/// API server errors.
#[derive(Debug, thiserror::Error)]
pub enum HttpServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================
