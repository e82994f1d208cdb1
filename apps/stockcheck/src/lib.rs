#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements,
        clippy::similar_names
    )
)]

//! StockCheck - Watchlist Price Feed
//!
//! Tracks a watchlist of tickers and keeps one authoritative quote for the
//! selected symbol by reconciling a push trade stream with a polled quote
//! fallback. A sidebar of polled prices covers the rest of the watchlist.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Pure types and rules
//!   - `quote`: Observations, quotes, connection states
//!   - `watchlist`: Symbol normalization and the ordered watchlist
//!   - `reconciliation`: Generation-guarded last-write-wins quote
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Price stream, quote poller, watchlist persistence
//!   - `services`: The session event loop and sidebar pricing
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `finnhub`: WebSocket trade stream, synthetic feed, REST quotes
//!   - `persistence`: JSON file watchlist store
//!   - `http`: Display API, health checks, metrics endpoint
//!   - `news`: News and signal backend client
//!   - `config`, `metrics`, `telemetry`
//!
//! # Data Flow
//!
//! ```text
//! trade stream ──┐
//!                ├──▶ session ──▶ reconciler ──▶ snapshot ──▶ HTTP API
//! quote polls ───┘       ▲
//!                        └── commands (add / remove / select)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::quote::{ConnectionState, Observation, Quote, QuoteSource};
pub use domain::reconciliation::{Generation, QuoteReconciler, Rejection};
pub use domain::watchlist::{DEFAULT_SYMBOLS, Symbol, Watchlist, WatchlistChange};

// Ports
pub use application::ports::{
    PollError, PolledQuote, PriceStreamPort, QuotePort, StreamError, StreamEvent, StreamSink,
    StreamSubscription, TaggedStreamEvent, WatchlistPersistence,
};

// Session
pub use application::services::{
    SessionHandle, SessionPorts, SessionSettings, SessionSnapshot, WatchlistSession,
};

// Infrastructure config
pub use infrastructure::config::{
    AppConfig, ConfigError, RestSettings, ServerSettings, StreamSettings, Token, TokenResolver,
    TokenSource,
};

// Adapters
pub use infrastructure::finnhub::{
    FinnhubRestClient, FinnhubStream, MockFeedConfig, RestConfig, StreamConfig,
};
pub use infrastructure::http::{ApiServer, ApiState, HttpServerError, router};
pub use infrastructure::news::{NewsClient, NewsError};
pub use infrastructure::persistence::{InMemoryWatchlist, JsonFileWatchlist};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
