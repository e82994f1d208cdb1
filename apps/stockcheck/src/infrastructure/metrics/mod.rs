//! Prometheus Metrics Module
//!
//! Exposes application metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Stream**: Trade prices received and connection errors by kind
//! - **Polls**: Quote and profile requests by outcome
//! - **Reconciliation**: Results discarded because the selection moved on
//! - **Watchlist**: Number of tracked symbols
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the API server port.

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Subsequent calls return the handle installed by the first one.
///
/// # Errors
///
/// Returns an error if another global recorder is already installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();

    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "stockcheck_stream_messages_total",
        "Trade prices received from the price stream"
    );
    describe_counter!(
        "stockcheck_stream_errors_total",
        "Price stream errors by kind"
    );
    describe_counter!(
        "stockcheck_polls_total",
        "Quote and profile requests by kind and outcome"
    );
    describe_counter!(
        "stockcheck_stale_results_total",
        "Results discarded because they belong to a previous selection"
    );
    describe_gauge!(
        "stockcheck_watchlist_symbols",
        "Number of symbols on the watchlist"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Kind of point-in-time request.
#[derive(Debug, Clone, Copy)]
pub enum PollKind {
    /// Selected symbol quote.
    Quote,
    /// Company profile lookup.
    Profile,
    /// Sidebar batch entry.
    Sidebar,
}

impl PollKind {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Quote => "quote",
            Self::Profile => "profile",
            Self::Sidebar => "sidebar",
        }
    }
}

/// Outcome of a point-in-time request.
#[derive(Debug, Clone, Copy)]
pub enum PollOutcome {
    /// Usable data returned.
    Success,
    /// Request succeeded without usable data.
    Empty,
    /// Request failed.
    Failure,
}

impl PollOutcome {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Empty => "empty",
            Self::Failure => "failure",
        }
    }
}

/// Source of a result discarded as stale.
#[derive(Debug, Clone, Copy)]
pub enum StaleSource {
    /// Stream event from a torn-down subscription.
    Stream,
    /// Quote poll for a previous selection.
    Quote,
    /// Profile lookup for a previous selection.
    Profile,
    /// Sidebar batch for a previous watchlist.
    Sidebar,
}

impl StaleSource {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Stream => "stream",
            Self::Quote => "quote",
            Self::Profile => "profile",
            Self::Sidebar => "sidebar",
        }
    }
}

/// Record a trade price received from the stream.
pub fn record_stream_message() {
    counter!("stockcheck_stream_messages_total").increment(1);
}

/// Record a stream error.
pub fn record_stream_error(kind: &'static str) {
    counter!("stockcheck_stream_errors_total", "kind" => kind).increment(1);
}

/// Record the outcome of a point-in-time request.
pub fn record_poll(kind: PollKind, outcome: PollOutcome) {
    counter!(
        "stockcheck_polls_total",
        "kind" => kind.as_str(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// Record a result discarded because the selection changed.
pub fn record_stale_result(source: StaleSource) {
    counter!("stockcheck_stale_results_total", "source" => source.as_str()).increment(1);
}

/// Update the watchlist size gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_watchlist_size(count: usize) {
    gauge!("stockcheck_watchlist_symbols").set(count as f64);
}

// =============================================================================
// Tests
// =============================================================================
