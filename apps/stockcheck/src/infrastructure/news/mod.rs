//! News and Signal Client
//!
//! Thin client for the companion news backend: recent financial headlines
//! and an on-demand trading signal derived from them.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// News client errors.
#[derive(Debug, thiserror::Error)]
pub enum NewsError {
    /// Backend answered with a non-success status.
    #[error("{operation} failed {status}")]
    Status {
        /// Which call failed.
        operation: &'static str,
        /// HTTP status code.
        status: u16,
    },

    /// Request could not be sent or the response not received.
    #[error("news backend unreachable: {0}")]
    Network(String),

    /// Response body did not match the expected shape.
    #[error("invalid news response: {0}")]
    Decode(String),
}

/// A news headline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Headline {
    /// Headline text.
    pub title: String,
    /// Publisher.
    pub source: String,
    /// Link to the article.
    pub url: String,
    /// Publication time as reported by the backend.
    pub published: String,
}

/// Recommended action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalAction {
    /// Buy.
    Buy,
    /// Hold.
    Hold,
    /// Sell.
    Sell,
}

/// Trading signal derived from the news.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signal {
    /// Recommended action.
    pub action: SignalAction,
    /// Explanation for the action.
    pub rationale: String,
}

/// HTTP client for the news backend.
#[derive(Debug, Clone)]
pub struct NewsClient {
    base_url: String,
    http: reqwest::Client,
}

impl NewsClient {
    /// Create a client for the backend at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Fetch the latest headlines.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, non-success status, or an
    /// unexpected body.
    pub async fn headlines(&self) -> Result<Vec<Headline>, NewsError> {
        let request = self.http.get(format!("{}/api/news", self.base_url));
        Self::execute(request, "news").await
    }

    /// Ask the backend for a trading signal.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, non-success status, or an
    /// unexpected body.
    pub async fn signal(&self) -> Result<Signal, NewsError> {
        let request = self.http.post(format!("{}/api/news/signal", self.base_url));
        Self::execute(request, "signal").await
    }

    async fn execute<T>(
        request: reqwest::RequestBuilder,
        operation: &'static str,
    ) -> Result<T, NewsError>
    where
        T: serde::de::DeserializeOwned,
    {
        let response = request
            .send()
            .await
            .map_err(|e| NewsError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(operation, status = status.as_u16(), "News backend request failed");
            return Err(NewsError::Status {
                operation,
                status: status.as_u16(),
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| NewsError::Decode(e.to_string()))
    }
}
