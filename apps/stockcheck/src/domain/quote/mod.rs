//! Quote Types
//!
//! The authoritative price record for the selected symbol, the observations
//! that price sources propose for it, and the externally visible state of a
//! stream subscription.

use chrono::{DateTime, Utc};
use serde::Serialize;

// =============================================================================
// Quote Source
// =============================================================================

/// Provenance of an accepted quote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuoteSource {
    /// Last trade price from the push stream.
    Stream,
    /// Point-in-time quote from the pull endpoint.
    PolledQuote,
}

impl QuoteSource {
    /// Get the source label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stream => "stream",
            Self::PolledQuote => "polled-quote",
        }
    }
}

// =============================================================================
// Observations
// =============================================================================

/// A price proposed by one of the sources.
///
/// Sources never mutate the quote directly; the reconciler decides whether an
/// observation is accepted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Observation {
    /// Trade tick from the stream. Carries no previous close.
    Stream {
        /// Last trade price.
        price: f64,
    },
    /// Polled quote.
    Polled {
        /// Current price, or the previous close when the market is closed.
        price: f64,
        /// Previous session close, when the response carried one.
        previous_close: Option<f64>,
    },
}

impl Observation {
    /// Price carried by the observation.
    #[must_use]
    pub const fn price(&self) -> f64 {
        match self {
            Self::Stream { price } | Self::Polled { price, .. } => *price,
        }
    }

    /// Source that produced the observation.
    #[must_use]
    pub const fn source(&self) -> QuoteSource {
        match self {
            Self::Stream { .. } => QuoteSource::Stream,
            Self::Polled { .. } => QuoteSource::PolledQuote,
        }
    }

    /// Whether the price is a usable, strictly positive number.
    #[must_use]
    pub fn has_valid_price(&self) -> bool {
        is_positive_price(self.price())
    }
}

/// Check that a price is finite and strictly positive.
#[must_use]
pub fn is_positive_price(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

// =============================================================================
// Quote
// =============================================================================

/// Most recently accepted price for the selected symbol.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quote {
    /// Accepted price (always > 0).
    pub price: f64,
    /// Arrival time of the observation.
    pub timestamp: DateTime<Utc>,
    /// Where the price came from.
    pub source: QuoteSource,
    /// Previous session close (always > 0 when present).
    pub previous_close: Option<f64>,
}

impl Quote {
    /// Percent change against the previous close.
    #[must_use]
    pub fn change_percent(&self) -> Option<f64> {
        self.previous_close
            .and_then(|close| change_percent(self.price, close))
    }
}

/// Percent change from `previous_close` to `price`.
///
/// Returns `None` unless both values are usable prices.
#[must_use]
pub fn change_percent(price: f64, previous_close: f64) -> Option<f64> {
    if is_positive_price(price) && is_positive_price(previous_close) {
        Some((price - previous_close) / previous_close * 100.0)
    } else {
        None
    }
}

// =============================================================================
// Connection State
// =============================================================================

/// Observable status of the current stream subscription.
///
/// Exposed for display and diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No symbol selected, nothing subscribed.
    #[default]
    Idle,
    /// Transport connection in progress, watchdog armed.
    Connecting,
    /// Connected and subscribed.
    Open,
    /// Connection closed by the remote side.
    Closed,
    /// Connection failed or the watchdog fired.
    Error,
    /// No credential; synthetic prices are generated locally.
    Mock,
}

impl ConnectionState {
    /// Get the state name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Error => "error",
            Self::Mock => "mock",
        }
    }

    /// Whether prices are currently flowing from the stream.
    #[must_use]
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Open | Self::Mock)
    }

    /// Whether the subscription has ended and will not recover by itself.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Error)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
