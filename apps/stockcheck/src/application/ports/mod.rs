//! Port Interfaces
//!
//! Defines the interfaces (ports) the session depends on, following the
//! Hexagonal Architecture pattern. Infrastructure adapters implement them.
//!
//! ## Driven Ports (Outbound)
//!
//! - `PriceStreamPort`: push price stream for a single symbol
//! - `QuotePort`: point-in-time quote and company profile lookups
//! - `WatchlistPersistence`: durable storage for the symbol list

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::domain::quote::{ConnectionState, Observation};
use crate::domain::reconciliation::Generation;
use crate::domain::watchlist::Symbol;

// =============================================================================
// Errors
// =============================================================================

/// Failures reported by a price stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// The connection did not open before the watchdog fired.
    #[error("Socket did not open (token/network/firewall?)")]
    ConnectTimeout,

    /// The transport failed after or during connection.
    #[error("WebSocket error (often invalid token or network): {0}")]
    Transport(String),

    /// The subscribe frame could not be sent.
    #[error("failed to subscribe: {0}")]
    SubscribeFailed(String),
}

impl StreamError {
    /// Get the error kind used in metrics labels.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ConnectTimeout => "connect_timeout",
            Self::Transport(_) => "transport",
            Self::SubscribeFailed(_) => "subscribe_failed",
        }
    }
}

/// Failures of a point-in-time quote or profile request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PollError {
    /// The endpoint answered with a non-success status.
    #[error("quote request failed with status {0}")]
    Status(u16),

    /// The request never produced a response.
    #[error("quote request failed: {0}")]
    Network(String),

    /// The response body could not be decoded.
    #[error("invalid quote response: {0}")]
    Decode(String),
}

impl PollError {
    /// Get the error kind used in metrics labels.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Status(_) => "status",
            Self::Network(_) => "network",
            Self::Decode(_) => "decode",
        }
    }
}

/// Failures reading or writing the persisted watchlist.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// Filesystem error.
    #[error("watchlist I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stored value is not a JSON array of strings.
    #[error("watchlist JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// Price Stream Port
// =============================================================================

/// Event emitted by a price stream subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Connection state changed.
    Status(ConnectionState),
    /// Last trade price received.
    Quote {
        /// Trade price.
        price: f64,
    },
    /// Connection level failure.
    Error(StreamError),
}

/// Stream event tagged with the generation that opened the subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedStreamEvent {
    /// Selection epoch the subscription belongs to.
    pub generation: Generation,
    /// The event itself.
    pub event: StreamEvent,
}

/// Delivery end of a stream subscription.
///
/// Every event is tagged with the sink's generation. Once the sink is
/// detached nothing more is delivered, even if the producer keeps running
/// for a moment.
#[derive(Debug, Clone)]
pub struct StreamSink {
    generation: Generation,
    tx: mpsc::Sender<TaggedStreamEvent>,
    detached: CancellationToken,
}

impl StreamSink {
    /// Create a sink delivering into `tx`.
    #[must_use]
    pub fn new(generation: Generation, tx: mpsc::Sender<TaggedStreamEvent>) -> Self {
        Self {
            generation,
            tx,
            detached: CancellationToken::new(),
        }
    }

    /// Bind the sink to a subscription's cancellation token.
    #[must_use]
    pub fn detach_on(self, token: &CancellationToken) -> Self {
        Self {
            detached: token.clone(),
            ..self
        }
    }

    /// Generation this sink tags events with.
    #[must_use]
    pub const fn generation(&self) -> Generation {
        self.generation
    }

    /// Check if the sink no longer delivers events.
    #[must_use]
    pub fn is_detached(&self) -> bool {
        self.detached.is_cancelled() || self.tx.is_closed()
    }

    /// Report a connection state change.
    pub async fn status(&self, state: ConnectionState) -> bool {
        self.emit(StreamEvent::Status(state)).await
    }

    /// Report a trade price.
    pub async fn quote(&self, price: f64) -> bool {
        self.emit(StreamEvent::Quote { price }).await
    }

    /// Report a failure.
    pub async fn error(&self, error: StreamError) -> bool {
        self.emit(StreamEvent::Error(error)).await
    }

    /// Deliver an event. Returns `false` when the sink is detached.
    async fn emit(&self, event: StreamEvent) -> bool {
        if self.detached.is_cancelled() {
            return false;
        }

        let tagged = TaggedStreamEvent {
            generation: self.generation,
            event,
        };

        tokio::select! {
            biased;
            () = self.detached.cancelled() => false,
            sent = self.tx.send(tagged) => sent.is_ok(),
        }
    }
}

/// Handle to a running stream subscription.
///
/// Dropping the handle tears the subscription down.
#[derive(Debug)]
pub struct StreamSubscription {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl StreamSubscription {
    /// Wrap a running subscription task.
    #[must_use]
    pub const fn new(cancel: CancellationToken, task: JoinHandle<()>) -> Self {
        Self {
            cancel,
            task: Some(task),
        }
    }

    /// Subscription with no background task.
    #[must_use]
    pub fn inert(cancel: CancellationToken) -> Self {
        Self { cancel, task: None }
    }

    /// Stop emitting events and release the connection.
    ///
    /// Idempotent. The background task finishes its best-effort cleanup on
    /// its own.
    pub fn teardown(&self) {
        self.cancel.cancel();
    }

    /// Check if the subscription was torn down.
    #[must_use]
    pub fn is_torn_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Tear down and wait for the background task to finish.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
            && e.is_panic()
        {
            tracing::error!(error = %e, "Stream subscription task panicked");
        }
    }
}

impl Drop for StreamSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Opens push price subscriptions.
pub trait PriceStreamPort: Send + Sync {
    /// Subscribe to trades for `symbol`, delivering events into `sink`.
    ///
    /// Must be called from within a Tokio runtime.
    fn open(&self, symbol: &Symbol, sink: StreamSink) -> StreamSubscription;
}

// =============================================================================
// Quote Port
// =============================================================================

/// A usable price returned by the quote endpoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolledQuote {
    /// Current price, or the previous close when no trade happened today.
    pub price: f64,
    /// Previous session close, when positive.
    pub previous_close: Option<f64>,
}

impl PolledQuote {
    /// Convert into an observation for the reconciler.
    #[must_use]
    pub const fn observation(self) -> Observation {
        Observation::Polled {
            price: self.price,
            previous_close: self.previous_close,
        }
    }
}

/// Company metadata shown next to the selected symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanyProfile {
    /// Company display name.
    pub name: String,
}

/// Result of one entry in a batch poll.
pub type BatchQuote = (Symbol, Result<Option<PolledQuote>, PollError>);

/// Point-in-time quote and profile lookups.
#[async_trait]
pub trait QuotePort: Send + Sync {
    /// Whether a credential is configured. Without one no request is made.
    fn has_credential(&self) -> bool;

    /// Fetch the last quote for a symbol.
    ///
    /// Returns `Ok(None)` without a credential or when the response has no
    /// usable price.
    async fn fetch_quote(&self, symbol: &Symbol) -> Result<Option<PolledQuote>, PollError>;

    /// Fetch the company profile for a symbol.
    async fn fetch_profile(&self, symbol: &Symbol) -> Result<Option<CompanyProfile>, PollError>;

    /// Fetch quotes for many symbols concurrently.
    ///
    /// Each symbol gets an independent result, in input order.
    async fn fetch_quotes(&self, symbols: &[Symbol]) -> Vec<BatchQuote> {
        let requests = symbols.iter().map(|symbol| async move {
            let result = self.fetch_quote(symbol).await;
            (symbol.clone(), result)
        });
        futures::future::join_all(requests).await
    }
}

// =============================================================================
// Watchlist Persistence Port
// =============================================================================

/// Durable storage for the ordered symbol list.
#[cfg_attr(test, mockall::automock)]
pub trait WatchlistPersistence: Send + Sync {
    /// Load the stored list. `Ok(None)` means nothing has been stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreadable or holds something other
    /// than a list of strings.
    fn load(&self) -> Result<Option<Vec<String>>, PersistenceError>;

    /// Replace the stored list.
    ///
    /// # Errors
    ///
    /// Returns an error if the list could not be written.
    fn save(&self, symbols: &[String]) -> Result<(), PersistenceError>;
}
