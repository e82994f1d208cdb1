//! Watchlist Persistence Adapters
//!
//! The watchlist is stored as a JSON array of uppercase tickers:
//!
//! ```json
//! ["META", "AAPL", "GOOGL"]
//! ```

use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::application::ports::{PersistenceError, WatchlistPersistence};

/// Watchlist stored in a JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileWatchlist {
    path: PathBuf,
}

impl JsonFileWatchlist {
    /// Store backed by `path`. The file is created on first save.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl WatchlistPersistence for JsonFileWatchlist {
    fn load(&self) -> Result<Option<Vec<String>>, PersistenceError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        Ok(Some(serde_json::from_str(&contents)?))
    }

    fn save(&self, symbols: &[String]) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string(symbols)?;
        std::fs::write(&self.path, json)?;
        tracing::debug!(path = %self.path.display(), count = symbols.len(), "Watchlist saved");
        Ok(())
    }
}

/// Watchlist held in memory. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct InMemoryWatchlist {
    symbols: Mutex<Option<Vec<String>>>,
}

impl InMemoryWatchlist {
    /// Empty store; `load` returns `None` until the first save.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `symbols`.
    #[must_use]
    pub fn with_symbols(symbols: Vec<String>) -> Self {
        Self {
            symbols: Mutex::new(Some(symbols)),
        }
    }

    /// Last saved list.
    #[must_use]
    pub fn snapshot(&self) -> Option<Vec<String>> {
        self.symbols.lock().clone()
    }
}

impl WatchlistPersistence for InMemoryWatchlist {
    fn load(&self) -> Result<Option<Vec<String>>, PersistenceError> {
        Ok(self.symbols.lock().clone())
    }

    fn save(&self, symbols: &[String]) -> Result<(), PersistenceError> {
        *self.symbols.lock() = Some(symbols.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(symbols: &[&str]) -> Vec<String> {
        symbols.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn missing_file_loads_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileWatchlist::new(dir.path().join("watchlist.json"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileWatchlist::new(dir.path().join("nested/state/watchlist.json"));

        store.save(&strings(&["TSLA", "AAPL"])).unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(raw, r#"["TSLA","AAPL"]"#);
        assert_eq!(store.load().unwrap(), Some(strings(&["TSLA", "AAPL"])));
    }

    #[test]
    fn empty_list_is_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileWatchlist::new(dir.path().join("watchlist.json"));

        store.save(&[]).unwrap();
        assert_eq!(store.load().unwrap(), Some(Vec::new()));
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watchlist.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = JsonFileWatchlist::new(path);
        assert!(matches!(store.load(), Err(PersistenceError::Json(_))));
    }

    #[test]
    fn in_memory_round_trip() {
        let store = InMemoryWatchlist::new();
        assert!(store.load().unwrap().is_none());

        store.save(&strings(&["NVDA"])).unwrap();
        assert_eq!(store.snapshot(), Some(strings(&["NVDA"])));
        assert_eq!(
            InMemoryWatchlist::with_symbols(strings(&["A"])).load().unwrap(),
            Some(strings(&["A"]))
        );
    }
}
