//! Quote Reconciliation
//!
//! Merges observations from the stream and the poller into one authoritative
//! quote for the selected symbol.
//!
//! # Rules
//!
//! - Last write wins, regardless of source. During market hours the stream
//!   dominates simply because it arrives more often; after hours only the
//!   poller produces data.
//! - Stream observations keep the previously known previous close.
//! - Polled observations carry their own previous close.
//! - Only a symbol change clears the quote. Every symbol change starts a new
//!   [`Generation`], and observations requested under an older generation
//!   are rejected.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::quote::{Observation, Quote};
use super::watchlist::Symbol;

// =============================================================================
// Generation
// =============================================================================

/// Identifies one selection epoch.
///
/// Every asynchronous operation scoped to a symbol carries the generation
/// that started it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct Generation(u64);

impl Generation {
    /// Raw counter value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl std::fmt::Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Rejection
// =============================================================================

/// Reason an observation was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    /// Observation belongs to a previous selection.
    #[error("stale observation from generation {received} (current {current})")]
    Stale {
        /// Generation currently accepted.
        current: Generation,
        /// Generation the observation was tagged with.
        received: Generation,
    },

    /// Price was not a finite positive number.
    #[error("observation price is not a positive number")]
    InvalidPrice,
}

// =============================================================================
// Reconciler
// =============================================================================

/// Single-owner state machine holding the current quote.
///
/// # Example
///
/// ```rust
/// use chrono::Utc;
/// use stockcheck::domain::quote::{Observation, QuoteSource};
/// use stockcheck::domain::reconciliation::QuoteReconciler;
/// use stockcheck::domain::watchlist::Symbol;
///
/// let mut reconciler = QuoteReconciler::new();
/// let generation = reconciler.reset(Symbol::parse("AAPL"));
///
/// let polled = Observation::Polled { price: 190.0, previous_close: Some(188.0) };
/// reconciler.apply(generation, polled, Utc::now()).unwrap();
///
/// let quote = reconciler.apply(generation, Observation::Stream { price: 190.5 }, Utc::now()).unwrap();
/// assert_eq!(quote.source, QuoteSource::Stream);
/// assert_eq!(quote.previous_close, Some(188.0));
/// ```
#[derive(Debug, Default)]
pub struct QuoteReconciler {
    generation: Generation,
    symbol: Option<Symbol>,
    current: Option<Quote>,
}

impl QuoteReconciler {
    /// Create a reconciler with no symbol and no quote.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            generation: Generation(0),
            symbol: None,
            current: None,
        }
    }

    /// Start a new selection epoch.
    ///
    /// Clears the quote and returns the generation that new observations
    /// must be tagged with.
    pub fn reset(&mut self, symbol: Option<Symbol>) -> Generation {
        self.generation = self.generation.next();
        self.symbol = symbol;
        self.current = None;
        self.generation
    }

    /// Generation currently accepted.
    #[must_use]
    pub const fn generation(&self) -> Generation {
        self.generation
    }

    /// Symbol the current generation belongs to.
    #[must_use]
    pub const fn symbol(&self) -> Option<&Symbol> {
        self.symbol.as_ref()
    }

    /// Current authoritative quote.
    #[must_use]
    pub const fn current(&self) -> Option<&Quote> {
        self.current.as_ref()
    }

    /// Check if an operation tagged with `generation` is still relevant.
    #[must_use]
    pub fn is_current(&self, generation: Generation) -> bool {
        self.generation == generation
    }

    /// Apply an observation that arrived at `arrived_at`.
    ///
    /// # Errors
    ///
    /// Returns [`Rejection::Stale`] for observations from an older
    /// generation and [`Rejection::InvalidPrice`] for unusable prices. The
    /// current quote is left untouched in both cases.
    pub fn apply(
        &mut self,
        generation: Generation,
        observation: Observation,
        arrived_at: DateTime<Utc>,
    ) -> Result<&Quote, Rejection> {
        if !self.is_current(generation) {
            return Err(Rejection::Stale {
                current: self.generation,
                received: generation,
            });
        }

        if !observation.has_valid_price() {
            return Err(Rejection::InvalidPrice);
        }

        let previous_close = match observation {
            Observation::Stream { .. } => self.current.as_ref().and_then(|q| q.previous_close),
            Observation::Polled { previous_close, .. } => {
                previous_close.filter(|close| close.is_finite() && *close > 0.0)
            }
        };

        let quote = self.current.insert(Quote {
            price: observation.price(),
            timestamp: arrived_at,
            source: observation.source(),
            previous_close,
        });

        Ok(quote)
    }
}
