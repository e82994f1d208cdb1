//! Sidebar Pricing
//!
//! Latest polled price, previous close, and daily change for every symbol
//! on the watchlist. Fed by batch polls on a fixed interval.

use std::collections::HashMap;

use serde::Serialize;

use crate::application::ports::BatchQuote;
use crate::domain::quote::change_percent;
use crate::domain::watchlist::{Symbol, Watchlist};

/// Error shown when no credential is configured.
pub const NO_TOKEN_MESSAGE: &str = "Add STOCK_API token to load prices";

/// One row of the sidebar.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SidebarEntry {
    /// Ticker.
    pub symbol: Symbol,
    /// Last polled price.
    pub price: Option<f64>,
    /// Previous session close.
    pub previous_close: Option<f64>,
    /// Percent change against the previous close.
    pub change_percent: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct PricePoint {
    price: f64,
    previous_close: Option<f64>,
}

/// Summary of one applied batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchOutcome {
    /// Symbols with a usable price.
    pub priced: usize,
    /// Symbols whose request succeeded without a usable price.
    pub empty: usize,
    /// Symbols whose request failed.
    pub failed: usize,
}

/// Sidebar price table.
#[derive(Debug, Default)]
pub struct SidebarPrices {
    prices: HashMap<Symbol, PricePoint>,
    error: Option<String>,
}

impl SidebarPrices {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply the results of a batch poll.
    ///
    /// Successful entries are applied even when others failed.
    pub fn apply_batch(&mut self, results: Vec<BatchQuote>) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();

        for (symbol, result) in results {
            match result {
                Ok(Some(quote)) => {
                    outcome.priced += 1;
                    self.prices.insert(
                        symbol,
                        PricePoint {
                            price: quote.price,
                            previous_close: quote.previous_close,
                        },
                    );
                }
                Ok(None) => {
                    outcome.empty += 1;
                    self.prices.remove(&symbol);
                }
                Err(e) => {
                    outcome.failed += 1;
                    tracing::debug!(symbol = %symbol, error = %e, "Sidebar quote failed");
                }
            }
        }

        self.error = (outcome.failed > 0).then(|| {
            format!("Failed to load prices for {} symbol(s)", outcome.failed)
        });

        outcome
    }

    /// Drop prices for symbols no longer on the watchlist.
    pub fn retain(&mut self, watchlist: &Watchlist) {
        self.prices.retain(|symbol, _| watchlist.contains(symbol));
    }

    /// Record that prices cannot be loaded without a credential.
    pub fn mark_missing_credential(&mut self) {
        self.error = Some(NO_TOKEN_MESSAGE.to_string());
    }

    /// Current error message, if any.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Rows in watchlist order. Symbols without a price yet have empty fields.
    #[must_use]
    pub fn entries(&self, watchlist: &Watchlist) -> Vec<SidebarEntry> {
        watchlist
            .symbols()
            .iter()
            .map(|symbol| {
                let point = self.prices.get(symbol);
                let price = point.map(|p| p.price);
                let previous_close = point.and_then(|p| p.previous_close);
                SidebarEntry {
                    symbol: symbol.clone(),
                    price,
                    previous_close,
                    change_percent: price
                        .zip(previous_close)
                        .and_then(|(price, close)| change_percent(price, close)),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{PollError, PolledQuote};

    fn sym(s: &str) -> Symbol {
        Symbol::parse(s).unwrap()
    }

    fn quote(price: f64, previous_close: Option<f64>) -> PolledQuote {
        PolledQuote {
            price,
            previous_close,
        }
    }

    #[test]
    fn entries_follow_watchlist_order() {
        let watchlist = Watchlist::with_defaults();
        let mut sidebar = SidebarPrices::new();

        sidebar.apply_batch(vec![
            (sym("GOOGL"), Ok(Some(quote(110.0, Some(100.0))))),
            (sym("META"), Ok(Some(quote(300.0, None)))),
        ]);

        let entries = sidebar.entries(&watchlist);
        let symbols: Vec<&str> = entries.iter().map(|e| e.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["META", "AAPL", "GOOGL"]);

        assert_eq!(entries[0].price, Some(300.0));
        assert!(entries[0].change_percent.is_none());
        assert!(entries[1].price.is_none());
        assert!((entries[2].change_percent.unwrap() - 10.0).abs() < 1e-9);
        assert!(sidebar.error().is_none());
    }

    #[test]
    fn partial_failure_applies_successes() {
        let watchlist = Watchlist::with_defaults();
        let mut sidebar = SidebarPrices::new();

        let outcome = sidebar.apply_batch(vec![
            (sym("META"), Ok(Some(quote(300.0, Some(290.0))))),
            (sym("AAPL"), Err(PollError::Status(429))),
            (sym("GOOGL"), Ok(None)),
        ]);

        assert_eq!(
            outcome,
            BatchOutcome {
                priced: 1,
                empty: 1,
                failed: 1
            }
        );
        assert_eq!(sidebar.entries(&watchlist)[0].price, Some(300.0));
        assert_eq!(
            sidebar.error(),
            Some("Failed to load prices for 1 symbol(s)")
        );
    }

    #[test]
    fn failed_refresh_keeps_previous_price() {
        let watchlist = Watchlist::with_defaults();
        let mut sidebar = SidebarPrices::new();

        sidebar.apply_batch(vec![(sym("AAPL"), Ok(Some(quote(190.0, None))))]);
        sidebar.apply_batch(vec![(
            sym("AAPL"),
            Err(PollError::Network("reset".into())),
        )]);

        assert_eq!(sidebar.entries(&watchlist)[1].price, Some(190.0));
    }

    #[test]
    fn successful_batch_clears_error() {
        let mut sidebar = SidebarPrices::new();
        sidebar.mark_missing_credential();
        assert_eq!(sidebar.error(), Some(NO_TOKEN_MESSAGE));

        sidebar.apply_batch(vec![(sym("AAPL"), Ok(Some(quote(190.0, None))))]);
        assert!(sidebar.error().is_none());
    }

    #[test]
    fn retain_drops_removed_symbols() {
        let mut watchlist = Watchlist::with_defaults();
        let mut sidebar = SidebarPrices::new();
        sidebar.apply_batch(vec![(sym("AAPL"), Ok(Some(quote(190.0, None))))]);

        watchlist.remove("AAPL");
        sidebar.retain(&watchlist);
        watchlist.add("AAPL");

        assert!(sidebar.entries(&watchlist)[2].price.is_none());
    }
}
