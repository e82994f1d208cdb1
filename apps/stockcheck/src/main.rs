//! StockCheck Binary
//!
//! Starts the watchlist session and the display API.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p stockcheck -- --token <FINNHUB_TOKEN>
//! ```
//!
//! # Environment Variables
//!
//! - `STOCK_API` / `REACT_APP_STOCK_API`: Finnhub API token (synthetic prices when unset)
//! - `STOCKCHECK_STREAM_URL`: Trade stream endpoint (default: wss://ws.finnhub.io)
//! - `STOCKCHECK_REST_URL`: REST base URL (default: <https://finnhub.io>)
//! - `STOCKCHECK_OPEN_TIMEOUT_MS`: Stream open watchdog (default: 5000)
//! - `STOCKCHECK_MOCK_INTERVAL_MS`: Synthetic price interval (default: 1000)
//! - `STOCKCHECK_SIDEBAR_INTERVAL_SECS`: Sidebar refresh interval (default: 30)
//! - `STOCKCHECK_HTTP_TIMEOUT_SECS`: REST request timeout (default: 10)
//! - `STOCKCHECK_WATCHLIST_PATH`: Watchlist file (default: watchlist.json)
//! - `STOCKCHECK_HTTP_PORT`: API port (default: 8080)
//! - `STOCKCHECK_NEWS_URL`: News backend base URL (news disabled when unset)
//! - `OTEL_ENABLED`: Export spans over OTLP (default: false)
//! - `RUST_LOG`: Log filter (default: stockcheck=info)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use stockcheck::infrastructure::telemetry;
use stockcheck::{
    ApiServer, ApiState, AppConfig, FinnhubRestClient, FinnhubStream, JsonFileWatchlist,
    NewsClient, RestConfig, SessionPorts, SessionSettings, StreamConfig, WatchlistSession,
    init_metrics,
};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Time allowed for the session to release its subscription on shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Watchlist price feed with stream/poll reconciliation.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Finnhub API token. Build-time and environment tokens take precedence.
    #[arg(long)]
    token: Option<String>,

    /// Override the API port.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("failed to install rustls crypto provider"))?;

    load_dotenv();

    let _telemetry_guard = telemetry::init().context("failed to initialize telemetry")?;

    tracing::info!("Starting StockCheck");

    let _metrics_handle = init_metrics().context("failed to initialize metrics")?;

    let mut config = AppConfig::from_env(cli.token).context("invalid configuration")?;
    if let Some(port) = cli.port {
        config.server.http_port = port;
    }
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    let stream = FinnhubStream::new(StreamConfig::from_settings(
        &config.stream,
        config.token.clone(),
    ));
    let quotes = FinnhubRestClient::new(RestConfig::from_settings(
        &config.rest,
        config.token.clone(),
    ))
    .context("failed to build REST client")?;
    let persistence = JsonFileWatchlist::new(config.watchlist_path.clone());

    let ports = SessionPorts {
        stream: Arc::new(stream),
        quotes: Arc::new(quotes),
        persistence: Arc::new(persistence),
    };
    let settings = SessionSettings {
        sidebar_interval: config.sidebar_interval,
        ..SessionSettings::default()
    };
    let (session, session_task) = WatchlistSession::spawn(ports, settings, shutdown_token.clone());

    let news = config
        .news_url
        .as_deref()
        .map(|url| NewsClient::new(url, config.rest.timeout))
        .transpose()
        .context("failed to build news client")?;

    let api_state = Arc::new(ApiState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        session,
        news,
    ));
    let api_server = ApiServer::new(config.server.http_port, api_state, shutdown_token.clone());

    let api_shutdown = shutdown_token.clone();
    tokio::spawn(async move {
        if let Err(e) = api_server.run().await {
            tracing::error!(error = %e, "API server error");
            api_shutdown.cancel();
        }
    });

    tracing::info!("StockCheck ready");

    await_shutdown(shutdown_token).await;

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, session_task)
        .await
        .is_err()
    {
        tracing::warn!("Session did not stop in time");
    }

    tracing::info!("StockCheck stopped");
    Ok(())
}

/// Log the parsed configuration.
fn log_config(config: &AppConfig) {
    match &config.token_source {
        Some(source) => tracing::info!(source = %source, "API token found"),
        None => tracing::warn!("No API token found, prices will be synthetic"),
    }
    tracing::info!(
        http_port = config.server.http_port,
        watchlist = %config.watchlist_path.display(),
        sidebar_interval_secs = config.sidebar_interval.as_secs(),
        news = config.news_url.is_some(),
        "Configuration loaded"
    );
    tracing::debug!(
        stream_url = %config.stream.url,
        rest_url = %config.rest.base_url,
        open_timeout_ms = config.stream.open_timeout.as_millis(),
        "Market data endpoints"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT) or an internal cancel.
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
        () = shutdown_token.cancelled() => {
            tracing::info!("Shutdown requested internally");
        }
    }

    shutdown_token.cancel();
}
