//! Watchlist Types
//!
//! Ordered set of tracked symbols with a selection pointer.
//!
//! # Invariants
//!
//! - Symbols are trimmed, uppercase, and non-empty.
//! - Each symbol appears at most once; insertion order is preserved.
//! - The selection, if set, always references a symbol in the list. When the
//!   selected symbol is removed the selection falls back to the first
//!   remaining symbol, or to none.

use serde::Serialize;

/// Symbols used when nothing has been persisted yet.
pub const DEFAULT_SYMBOLS: [&str; 3] = ["META", "AAPL", "GOOGL"];

// =============================================================================
// Symbol
// =============================================================================

/// Normalized stock ticker.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// Normalize raw user input into a symbol.
    ///
    /// Returns `None` when the input is blank.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let cleaned = raw.trim().to_uppercase();
        if cleaned.is_empty() {
            None
        } else {
            Some(Self(cleaned))
        }
    }

    /// Get the ticker string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// Watchlist Change
// =============================================================================

/// What a mutation actually changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WatchlistChange {
    /// The ordered symbol list changed.
    pub list_changed: bool,
    /// The selected symbol changed.
    pub selection_changed: bool,
}

impl WatchlistChange {
    /// Check if the mutation was a no-op.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        !self.list_changed && !self.selection_changed
    }
}

// =============================================================================
// Watchlist
// =============================================================================

/// User's ordered set of tracked symbols.
///
/// # Example
///
/// ```rust
/// use stockcheck::domain::watchlist::Watchlist;
///
/// let mut watchlist = Watchlist::new();
/// watchlist.add(" aapl ");
/// watchlist.add("AAPL");
///
/// assert_eq!(watchlist.len(), 1);
/// assert_eq!(watchlist.selected().map(|s| s.as_str()), Some("AAPL"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Watchlist {
    symbols: Vec<Symbol>,
    selected: Option<Symbol>,
}

impl Watchlist {
    /// Create an empty watchlist.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            symbols: Vec::new(),
            selected: None,
        }
    }

    /// Build a watchlist from raw entries, normalizing and de-duplicating them.
    ///
    /// The first entry becomes the selection.
    #[must_use]
    pub fn from_symbols<I, S>(raw: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut symbols: Vec<Symbol> = Vec::new();
        for symbol in raw.into_iter().filter_map(|s| Symbol::parse(s.as_ref())) {
            if !symbols.contains(&symbol) {
                symbols.push(symbol);
            }
        }

        let selected = symbols.first().cloned();
        Self { symbols, selected }
    }

    /// Watchlist seeded with [`DEFAULT_SYMBOLS`].
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::from_symbols(DEFAULT_SYMBOLS)
    }

    /// Symbols in insertion order.
    #[must_use]
    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    /// Currently selected symbol.
    #[must_use]
    pub const fn selected(&self) -> Option<&Symbol> {
        self.selected.as_ref()
    }

    /// Number of tracked symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Check if nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Check if a symbol is tracked.
    #[must_use]
    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.symbols.contains(symbol)
    }

    /// Symbols as plain strings, for persistence.
    #[must_use]
    pub fn to_strings(&self) -> Vec<String> {
        self.symbols.iter().map(|s| s.as_str().to_string()).collect()
    }

    /// Add a symbol and select it.
    ///
    /// Blank input is ignored. An already tracked symbol is only selected.
    pub fn add(&mut self, raw: &str) -> WatchlistChange {
        let Some(symbol) = Symbol::parse(raw) else {
            return WatchlistChange::default();
        };

        let list_changed = if self.symbols.contains(&symbol) {
            false
        } else {
            self.symbols.push(symbol.clone());
            true
        };

        let selection_changed = self.set_selection(Some(symbol));

        WatchlistChange {
            list_changed,
            selection_changed,
        }
    }

    /// Remove every occurrence of a symbol.
    pub fn remove(&mut self, raw: &str) -> WatchlistChange {
        let Some(symbol) = Symbol::parse(raw) else {
            return WatchlistChange::default();
        };

        let before = self.symbols.len();
        self.symbols.retain(|s| s != &symbol);
        let list_changed = self.symbols.len() != before;

        let selection_changed = self.revalidate_selection();

        WatchlistChange {
            list_changed,
            selection_changed,
        }
    }

    /// Select a tracked symbol. Unknown symbols are ignored.
    pub fn select(&mut self, raw: &str) -> WatchlistChange {
        let Some(symbol) = Symbol::parse(raw) else {
            return WatchlistChange::default();
        };

        if !self.symbols.contains(&symbol) {
            return WatchlistChange::default();
        }

        WatchlistChange {
            list_changed: false,
            selection_changed: self.set_selection(Some(symbol)),
        }
    }

    /// Re-establish the selection invariant.
    ///
    /// Returns `true` if the selection changed.
    fn revalidate_selection(&mut self) -> bool {
        let valid = self
            .selected
            .as_ref()
            .is_some_and(|s| self.symbols.contains(s));

        if valid {
            false
        } else {
            let fallback = self.symbols.first().cloned();
            self.set_selection(fallback)
        }
    }

    fn set_selection(&mut self, symbol: Option<Symbol>) -> bool {
        if self.selected == symbol {
            false
        } else {
            self.selected = symbol;
            true
        }
    }
}
