//! Application Configuration Settings
//!
//! Configuration types for the watchlist service, loaded from environment
//! variables. The API token is resolved once here and handed to components.

use std::path::PathBuf;
use std::time::Duration;

use super::token::{Token, TokenResolver, TokenSource};

/// Production REST host.
pub const DEFAULT_REST_URL: &str = "https://finnhub.io";

/// REST host used for `sandbox_` tokens.
pub const SANDBOX_REST_URL: &str = "https://sandbox.finnhub.io";

/// Push stream endpoint.
pub const DEFAULT_STREAM_URL: &str = "wss://ws.finnhub.io";

/// Price stream settings.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    /// WebSocket endpoint, without the token query.
    pub url: String,
    /// Watchdog for the connection to open.
    pub open_timeout: Duration,
    /// Tick interval of the synthetic feed used without a token.
    pub mock_interval: Duration,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_STREAM_URL.to_string(),
            open_timeout: Duration::from_millis(5000),
            mock_interval: Duration::from_millis(1000),
        }
    }
}

/// Quote and profile REST settings.
#[derive(Debug, Clone)]
pub struct RestSettings {
    /// Base URL of the REST API.
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for RestSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_REST_URL.to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Display API port.
    pub http_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { http_port: 8080 }
    }
}

/// Complete application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// API token. `None` selects mock mode.
    pub token: Option<Token>,
    /// Where the token came from.
    pub token_source: Option<TokenSource>,
    /// Price stream settings.
    pub stream: StreamSettings,
    /// REST settings.
    pub rest: RestSettings,
    /// Server port settings.
    pub server: ServerSettings,
    /// Interval between sidebar batch polls.
    pub sidebar_interval: Duration,
    /// Path of the persisted watchlist.
    pub watchlist_path: PathBuf,
    /// News backend base URL. `None` disables news.
    pub news_url: Option<String>,
}

impl AppConfig {
    /// Create configuration from environment variables.
    ///
    /// `injected` is the runtime token passed on the command line.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is present but invalid.
    pub fn from_env(injected: Option<String>) -> Result<Self, ConfigError> {
        Self::from_lookup(&TokenResolver::standard(injected), |key| {
            std::env::var(key).ok()
        })
    }

    /// Create configuration using `lookup` for every variable read.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is present but invalid.
    pub fn from_lookup<F>(resolver: &TokenResolver, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let (token, token_source) = resolver
            .resolve_with(&lookup)
            .map_or((None, None), |(token, source)| (Some(token), Some(source)));

        let stream_defaults = StreamSettings::default();
        let stream = StreamSettings {
            url: parse_url(&lookup, "STOCKCHECK_STREAM_URL", DEFAULT_STREAM_URL, &["ws", "wss"])?,
            open_timeout: parse_env_duration_millis(
                &lookup,
                "STOCKCHECK_OPEN_TIMEOUT_MS",
                stream_defaults.open_timeout,
            )?,
            mock_interval: parse_env_duration_millis(
                &lookup,
                "STOCKCHECK_MOCK_INTERVAL_MS",
                stream_defaults.mock_interval,
            )?,
        };

        let default_rest = if token.as_ref().is_some_and(Token::is_sandbox) {
            SANDBOX_REST_URL
        } else {
            DEFAULT_REST_URL
        };
        let rest = RestSettings {
            base_url: parse_url(&lookup, "STOCKCHECK_REST_URL", default_rest, &["http", "https"])?,
            timeout: parse_env_duration_secs(
                &lookup,
                "STOCKCHECK_HTTP_TIMEOUT_SECS",
                RestSettings::default().timeout,
            )?,
        };

        let server = ServerSettings {
            http_port: parse_env_u16(
                &lookup,
                "STOCKCHECK_HTTP_PORT",
                ServerSettings::default().http_port,
            ),
        };

        let sidebar_interval = parse_env_duration_secs(
            &lookup,
            "STOCKCHECK_SIDEBAR_INTERVAL_SECS",
            Duration::from_secs(30),
        )?;

        let watchlist_path = non_empty(&lookup, "STOCKCHECK_WATCHLIST_PATH")
            .map_or_else(|| PathBuf::from("watchlist.json"), PathBuf::from);

        let news_url = match non_empty(&lookup, "STOCKCHECK_NEWS_URL") {
            Some(_) => Some(parse_url(&lookup, "STOCKCHECK_NEWS_URL", "", &["http", "https"])?),
            None => None,
        };

        Ok(Self {
            token,
            token_source,
            stream,
            rest,
            server,
            sidebar_interval,
            watchlist_path,
            news_url,
        })
    }

    /// Check if a token is configured.
    #[must_use]
    pub const fn has_token(&self) -> bool {
        self.token.is_some()
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable has an unusable value.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Why the value was rejected.
        reason: String,
    },
    /// Environment variable is not a valid URL for its purpose.
    #[error("invalid URL in {key}: {url}")]
    InvalidUrl {
        /// Variable name.
        key: String,
        /// The rejected value.
        url: String,
    },
}

fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_env_u16<F>(lookup: &F, key: &str, default: u16) -> u16
where
    F: Fn(&str) -> Option<String>,
{
    non_empty(lookup, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_u64<F>(lookup: &F, key: &str) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = non_empty(lookup, key) else {
        return Ok(None);
    };

    match raw.parse::<u64>() {
        Ok(0) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            reason: "must be greater than zero".to_string(),
        }),
        Ok(value) => Ok(Some(value)),
        Err(e) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            reason: e.to_string(),
        }),
    }
}

fn parse_env_duration_secs<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    Ok(parse_env_u64(lookup, key)?.map_or(default, Duration::from_secs))
}

fn parse_env_duration_millis<F>(
    lookup: &F,
    key: &str,
    default: Duration,
) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    Ok(parse_env_u64(lookup, key)?.map_or(default, Duration::from_millis))
}

fn parse_url<F>(lookup: &F, key: &str, default: &str, schemes: &[&str]) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = non_empty(lookup, key) else {
        return Ok(default.to_string());
    };

    let invalid = || ConfigError::InvalidUrl {
        key: key.to_string(),
        url: raw.clone(),
    };

    let url = reqwest::Url::parse(&raw).map_err(|_| invalid())?;
    if !schemes.contains(&url.scheme()) {
        return Err(invalid());
    }

    Ok(raw.trim_end_matches('/').to_string())
}
