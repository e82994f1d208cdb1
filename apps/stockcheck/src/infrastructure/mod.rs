//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port interfaces
//! defined in the application layer.

/// Configuration and token resolution.
pub mod config;

/// Finnhub stream and REST adapters.
pub mod finnhub;

/// Display API and health endpoints.
pub mod http;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// News and signal backend client.
pub mod news;

/// Watchlist storage adapters.
pub mod persistence;

/// Logging and OpenTelemetry tracing integration.
pub mod telemetry;
