//! Trade Stream Connector
//!
//! Opens one WebSocket subscription per selected symbol and reports
//! connection state and trade prices into a [`StreamSink`].
//!
//! # Lifecycle
//!
//! ```text
//! connecting ──open──▶ open ──close──▶ closed
//!     │                  └──error──▶ error
//!     └──watchdog/error──▶ error
//! ```
//!
//! Without a token the connector reports `mock` and runs the synthetic feed
//! instead. There is no automatic reconnection; a new selection opens a new
//! subscription.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use super::codec::JsonCodec;
use super::messages::{InboundFrame, OutboundFrame};
use super::mock::{MockFeedConfig, run_mock_feed};
use crate::application::ports::{PriceStreamPort, StreamError, StreamSink, StreamSubscription};
use crate::domain::quote::ConnectionState;
use crate::domain::watchlist::Symbol;
use crate::infrastructure::config::{StreamSettings, Token};

/// Time allowed for the unsubscribe frame and close handshake on teardown.
const CLOSE_GRACE: Duration = Duration::from_millis(500);

// =============================================================================
// Configuration
// =============================================================================

/// Stream connector configuration.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// WebSocket endpoint without the token parameter.
    pub url: String,
    /// API token. `None` selects the synthetic feed.
    pub token: Option<Token>,
    /// Watchdog for the opening handshake.
    pub open_timeout: Duration,
    /// Synthetic feed settings.
    pub mock: MockFeedConfig,
}

impl StreamConfig {
    /// Build from application settings.
    #[must_use]
    pub fn from_settings(settings: &StreamSettings, token: Option<Token>) -> Self {
        Self {
            url: settings.url.clone(),
            token,
            open_timeout: settings.open_timeout,
            mock: MockFeedConfig::with_interval(settings.mock_interval),
        }
    }
}

// =============================================================================
// Connector
// =============================================================================

/// Finnhub trade stream connector.
#[derive(Debug, Clone)]
pub struct FinnhubStream {
    config: Arc<StreamConfig>,
}

impl FinnhubStream {
    /// Create a connector.
    #[must_use]
    pub fn new(config: StreamConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

impl PriceStreamPort for FinnhubStream {
    fn open(&self, symbol: &Symbol, sink: StreamSink) -> StreamSubscription {
        let cancel = CancellationToken::new();
        let sink = sink.detach_on(&cancel);
        let config = Arc::clone(&self.config);

        let task = match config.token.clone() {
            Some(token) => tokio::spawn(run_connection(
                config,
                token,
                symbol.clone(),
                sink,
                cancel.clone(),
            )),
            None => tokio::spawn(run_mock_feed(config.mock.clone(), sink, cancel.clone())),
        };

        StreamSubscription::new(cancel, task)
    }
}

// =============================================================================
// Connection Task
// =============================================================================

async fn fail(sink: &StreamSink, error: StreamError) {
    tracing::debug!(error = %error, "Price stream failed");
    if sink.status(ConnectionState::Error).await {
        sink.error(error).await;
    }
}

async fn run_connection(
    config: Arc<StreamConfig>,
    token: Token,
    symbol: Symbol,
    sink: StreamSink,
    cancel: CancellationToken,
) {
    if !sink.status(ConnectionState::Connecting).await {
        return;
    }

    let url = match reqwest::Url::parse_with_params(&config.url, &[("token", token.expose())]) {
        Ok(url) => url,
        Err(e) => {
            fail(&sink, StreamError::Transport(format!("invalid stream URL: {e}"))).await;
            return;
        }
    };

    tracing::info!(symbol = %symbol, endpoint = %config.url, "Connecting to price stream");

    let ws_stream = tokio::select! {
        biased;
        () = cancel.cancelled() => return,
        () = tokio::time::sleep(config.open_timeout) => {
            fail(&sink, StreamError::ConnectTimeout).await;
            return;
        }
        result = tokio_tungstenite::connect_async(url.as_str()) => match result {
            Ok((ws_stream, _response)) => ws_stream,
            Err(e) => {
                fail(&sink, StreamError::Transport(e.to_string())).await;
                return;
            }
        }
    };

    let (mut write, mut read) = ws_stream.split();
    let codec = JsonCodec::new();

    if !sink.status(ConnectionState::Open).await {
        let _ = tokio::time::timeout(CLOSE_GRACE, write.close()).await;
        return;
    }
    tracing::info!(symbol = %symbol, "Price stream open");

    send_subscribe(&mut write, &codec, &symbol, &sink).await;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                close_subscription(&mut write, &codec, &symbol).await;
                return;
            }
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if !handle_text(&codec, &symbol, text.as_str(), &sink).await {
                            close_subscription(&mut write, &codec, &symbol).await;
                            return;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        tracing::info!(symbol = %symbol, "Price stream closed");
                        sink.status(ConnectionState::Closed).await;
                        return;
                    }
                    // Pings are answered by tungstenite on the next read.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        fail(&sink, StreamError::Transport(e.to_string())).await;
                        return;
                    }
                }
            }
        }
    }
}

/// Request trades for `symbol`. A failure is reported without changing the
/// connection state.
async fn send_subscribe<W>(write: &mut W, codec: &JsonCodec, symbol: &Symbol, sink: &StreamSink)
where
    W: Sink<Message> + Unpin,
    W::Error: std::fmt::Display,
{
    let result = match codec.encode(&OutboundFrame::subscribe(symbol.as_str())) {
        Ok(json) => write
            .send(Message::Text(json.into()))
            .await
            .map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };

    if let Err(reason) = result {
        let error = StreamError::SubscribeFailed(reason);
        tracing::warn!(symbol = %symbol, error = %error, "Subscribe failed");
        sink.error(error).await;
    }
}

/// Send the unsubscribe frame and close the socket, bounded by
/// [`CLOSE_GRACE`]. Failures are ignored.
async fn close_subscription<W>(write: &mut W, codec: &JsonCodec, symbol: &Symbol)
where
    W: Sink<Message> + Unpin,
{
    let unsubscribe = codec.encode(&OutboundFrame::unsubscribe(symbol.as_str()));
    let _ = tokio::time::timeout(CLOSE_GRACE, async {
        if let Ok(json) = unsubscribe {
            let _ = write.send(Message::Text(json.into())).await;
        }
        let _ = write.close().await;
    })
    .await;
    tracing::debug!(symbol = %symbol, "Price stream torn down");
}

/// Forward the price carried by a text frame. Returns `false` once the sink
/// is detached.
async fn handle_text(codec: &JsonCodec, symbol: &Symbol, text: &str, sink: &StreamSink) -> bool {
    let frame = match codec.decode(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::trace!(error = %e, "Ignoring malformed stream message");
            return true;
        }
    };

    match frame {
        InboundFrame::Error { msg } => {
            tracing::warn!(symbol = %symbol, msg = ?msg, "Stream reported an error");
            true
        }
        frame => match frame.last_trade_price() {
            Some(price) => sink.quote(price).await,
            None => true,
        },
    }
}
