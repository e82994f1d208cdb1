//! Configuration Module
//!
//! Token resolution and environment-driven settings for the service.

mod settings;
mod token;

pub use settings::{
    AppConfig, ConfigError, DEFAULT_REST_URL, DEFAULT_STREAM_URL, RestSettings, SANDBOX_REST_URL,
    ServerSettings, StreamSettings,
};
pub use token::{Token, TokenResolver, TokenSource};
