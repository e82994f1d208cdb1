//! Finnhub REST Client
//!
//! Point-in-time quote and company profile lookups. Used as the after-hours
//! fallback for the selected symbol and to price the sidebar.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::application::ports::{CompanyProfile, PollError, PolledQuote, QuotePort};
use crate::domain::quote::is_positive_price;
use crate::domain::watchlist::Symbol;
use crate::infrastructure::config::{RestSettings, Token};

const QUOTE_PATH: &str = "/api/v1/quote";
const PROFILE_PATH: &str = "/api/v1/stock/profile2";

/// REST client configuration.
#[derive(Debug, Clone)]
pub struct RestConfig {
    /// Base URL without a trailing slash.
    pub base_url: String,
    /// API token. `None` disables all requests.
    pub token: Option<Token>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl RestConfig {
    /// Build from application settings.
    #[must_use]
    pub fn from_settings(settings: &RestSettings, token: Option<Token>) -> Self {
        Self {
            base_url: settings.base_url.clone(),
            token,
            timeout: settings.timeout,
        }
    }
}

/// Raw quote body. Fields other than `c` and `pc` are ignored.
#[derive(Debug, Deserialize)]
struct QuoteResponse {
    #[serde(default)]
    c: Option<serde_json::Value>,
    #[serde(default)]
    pc: Option<serde_json::Value>,
}

impl QuoteResponse {
    fn into_quote(self) -> Option<PolledQuote> {
        let current = self.c.as_ref().and_then(serde_json::Value::as_f64);
        let previous_close = self
            .pc
            .as_ref()
            .and_then(serde_json::Value::as_f64)
            .filter(|pc| is_positive_price(*pc));

        let price = current
            .filter(|c| is_positive_price(*c))
            .or(previous_close)?;

        Some(PolledQuote {
            price,
            previous_close,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ProfileResponse {
    #[serde(default)]
    name: Option<String>,
}

/// Finnhub REST client.
#[derive(Debug, Clone)]
pub struct FinnhubRestClient {
    http: reqwest::Client,
    config: RestConfig,
}

impl FinnhubRestClient {
    /// Create a client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: RestConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { http, config })
    }

    async fn get_json<T>(&self, path: &str, symbol: &Symbol) -> Result<Option<T>, PollError>
    where
        T: serde::de::DeserializeOwned,
    {
        let Some(token) = &self.config.token else {
            return Ok(None);
        };

        let url = format!("{}{path}", self.config.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[("symbol", symbol.as_str()), ("token", token.expose())])
            .send()
            .await
            .map_err(|e| PollError::Network(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PollError::Status(status.as_u16()));
        }

        let body = response
            .json::<T>()
            .await
            .map_err(|e| PollError::Decode(e.without_url().to_string()))?;

        Ok(Some(body))
    }
}

#[async_trait]
impl QuotePort for FinnhubRestClient {
    fn has_credential(&self) -> bool {
        self.config.token.is_some()
    }

    async fn fetch_quote(&self, symbol: &Symbol) -> Result<Option<PolledQuote>, PollError> {
        let quote = self
            .get_json::<QuoteResponse>(QUOTE_PATH, symbol)
            .await?
            .and_then(QuoteResponse::into_quote);

        if quote.is_none() {
            tracing::debug!(symbol = %symbol, "No tradable quote data");
        }
        Ok(quote)
    }

    async fn fetch_profile(&self, symbol: &Symbol) -> Result<Option<CompanyProfile>, PollError> {
        let profile = self
            .get_json::<ProfileResponse>(PROFILE_PATH, symbol)
            .await?
            .and_then(|body| body.name)
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .map(|name| CompanyProfile { name });

        Ok(profile)
    }
}
