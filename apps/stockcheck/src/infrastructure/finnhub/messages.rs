//! Finnhub WebSocket Message Types
//!
//! Wire format types for the Finnhub trade stream.
//!
//! # Outbound
//!
//! ```json
//! {"type": "subscribe", "symbol": "AAPL"}
//! {"type": "unsubscribe", "symbol": "AAPL"}
//! ```
//!
//! # Inbound
//!
//! ```json
//! {"type": "trade", "data": [{"p": 189.91, "s": "AAPL", "t": 1700000000000, "v": 100}]}
//! {"type": "ping"}
//! {"type": "error", "msg": "Invalid symbol"}
//! ```
//!
//! Unknown types decode to [`InboundFrame::Unknown`] and are ignored.

use serde::{Deserialize, Serialize};

/// Frame sent to the stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutboundFrame {
    /// Start receiving trades for a symbol.
    Subscribe {
        /// Ticker.
        symbol: String,
    },
    /// Stop receiving trades for a symbol.
    Unsubscribe {
        /// Ticker.
        symbol: String,
    },
}

impl OutboundFrame {
    /// Subscribe frame for `symbol`.
    #[must_use]
    pub fn subscribe(symbol: impl Into<String>) -> Self {
        Self::Subscribe {
            symbol: symbol.into(),
        }
    }

    /// Unsubscribe frame for `symbol`.
    #[must_use]
    pub fn unsubscribe(symbol: impl Into<String>) -> Self {
        Self::Unsubscribe {
            symbol: symbol.into(),
        }
    }
}

/// Frame received from the stream.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum InboundFrame {
    /// Batch of trades, oldest first.
    Trade {
        /// Trade ticks. Kept loosely typed so one odd tick does not reject
        /// the whole frame.
        #[serde(default)]
        data: Vec<serde_json::Value>,
    },
    /// Keep-alive.
    Ping,
    /// Server-side error notice.
    Error {
        /// Error text.
        #[serde(default)]
        msg: Option<String>,
    },
    /// Any other message type.
    #[serde(other)]
    Unknown,
}

impl InboundFrame {
    /// Price of the most recent trade in a trade frame.
    ///
    /// Only the last tick is consulted. Returns `None` when the frame is not
    /// a trade, carries no ticks, or the last tick's `p` is not a number.
    #[must_use]
    pub fn last_trade_price(&self) -> Option<f64> {
        match self {
            Self::Trade { data } => data.last()?.get("p")?.as_f64(),
            _ => None,
        }
    }
}
