//! API Token Resolution
//!
//! Locates the market data API token from a prioritized list of sources.
//! The first non-empty trimmed value wins:
//!
//! 1. Build-time `STOCK_API`, then `VITE_STOCK_API`
//! 2. Process environment `STOCK_API`, then `REACT_APP_STOCK_API`
//! 3. A runtime-injected value (`--token`)
//!
//! Resolution is side-effect free and never fails; no token means mock mode.

/// Market data API token.
#[derive(Clone, PartialEq, Eq)]
pub struct Token(String);

impl Token {
    /// Create a token from raw input. Blank input yields `None`.
    #[must_use]
    pub fn new(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    /// Get the token value for use in requests.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Check if this is a sandbox token.
    #[must_use]
    pub fn is_sandbox(&self) -> bool {
        self.0.starts_with("sandbox_")
    }
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Token").field(&"[REDACTED]").finish()
    }
}

/// Where a token was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    /// Captured from the build environment.
    BuildTime(&'static str),
    /// Read from the process environment.
    Environment(&'static str),
    /// Passed in at runtime.
    Injected,
}

impl std::fmt::Display for TokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BuildTime(key) => write!(f, "build-time {key}"),
            Self::Environment(key) => write!(f, "environment {key}"),
            Self::Injected => f.write_str("runtime injection"),
        }
    }
}

/// Prioritized token lookup.
#[derive(Debug, Clone)]
pub struct TokenResolver {
    build_time: Vec<(&'static str, Option<&'static str>)>,
    environment: Vec<&'static str>,
    injected: Option<String>,
}

impl TokenResolver {
    /// Resolver over the standard sources, with an optional injected value.
    #[must_use]
    pub fn standard(injected: Option<String>) -> Self {
        Self {
            build_time: vec![
                ("STOCK_API", option_env!("STOCK_API")),
                ("VITE_STOCK_API", option_env!("VITE_STOCK_API")),
            ],
            environment: vec!["STOCK_API", "REACT_APP_STOCK_API"],
            injected,
        }
    }

    /// Resolve against the process environment.
    #[must_use]
    pub fn resolve(&self) -> Option<(Token, TokenSource)> {
        self.resolve_with(|key| std::env::var(key).ok())
    }

    /// Resolve using `lookup` for environment reads.
    #[must_use]
    pub fn resolve_with<F>(&self, lookup: F) -> Option<(Token, TokenSource)>
    where
        F: Fn(&str) -> Option<String>,
    {
        let build_time = self.build_time.iter().find_map(|&(key, value)| {
            value
                .and_then(Token::new)
                .map(|token| (token, TokenSource::BuildTime(key)))
        });

        build_time
            .or_else(|| {
                self.environment.iter().find_map(|&key| {
                    lookup(key)
                        .as_deref()
                        .and_then(Token::new)
                        .map(|token| (token, TokenSource::Environment(key)))
                })
            })
            .or_else(|| {
                self.injected
                    .as_deref()
                    .and_then(Token::new)
                    .map(|token| (token, TokenSource::Injected))
            })
    }
}
