//! Finnhub Market Data Adapters
//!
//! Implements the price stream and quote ports against Finnhub.
//!
//! - [`FinnhubStream`]: WebSocket trade stream, or a synthetic feed without a token
//! - [`FinnhubRestClient`]: REST quote and company profile lookups

pub mod codec;
pub mod messages;
pub mod mock;
pub mod rest;
pub mod stream;

pub use codec::{CodecError, JsonCodec};
pub use messages::{InboundFrame, OutboundFrame};
pub use mock::{MockFeedConfig, PriceWalk};
pub use rest::{FinnhubRestClient, RestConfig};
pub use stream::{FinnhubStream, StreamConfig};
