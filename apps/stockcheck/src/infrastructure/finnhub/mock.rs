//! Synthetic Price Feed
//!
//! Stands in for the trade stream when no API token is configured. Emits a
//! bounded random walk on a fixed interval so the rest of the pipeline can
//! be exercised offline.

use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::application::ports::StreamSink;
use crate::domain::quote::ConnectionState;

/// Configuration for the synthetic feed.
#[derive(Debug, Clone)]
pub struct MockFeedConfig {
    /// Time between synthetic prices. The first price is immediate.
    pub interval: Duration,
    /// Lowest price the walk may reach.
    pub floor: f64,
    /// Highest price the walk may reach.
    pub ceiling: f64,
    /// Largest single step in either direction.
    pub max_step: f64,
    /// Fixed RNG seed for reproducible walks.
    pub seed: Option<u64>,
}

impl Default for MockFeedConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1000),
            floor: 100.0,
            ceiling: 150.0,
            max_step: 1.5,
            seed: None,
        }
    }
}

impl MockFeedConfig {
    /// Default band with a custom interval.
    #[must_use]
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            ..Self::default()
        }
    }
}

/// Bounded random walk.
#[derive(Debug)]
pub struct PriceWalk {
    rng: StdRng,
    price: f64,
    floor: f64,
    ceiling: f64,
    max_step: f64,
}

impl PriceWalk {
    /// Start a walk at a random point inside the band.
    #[must_use]
    pub fn new(config: &MockFeedConfig) -> Self {
        let mut rng = config
            .seed
            .map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64);
        let (floor, ceiling) = if config.floor <= config.ceiling {
            (config.floor, config.ceiling)
        } else {
            (config.ceiling, config.floor)
        };
        let price = if ceiling > floor {
            rng.random_range(floor..=ceiling)
        } else {
            floor
        };

        Self {
            rng,
            price,
            floor,
            ceiling,
            max_step: config.max_step.abs(),
        }
    }

    /// Advance one step and return the new price.
    pub fn step(&mut self) -> f64 {
        if self.max_step > 0.0 {
            let delta = self.rng.random_range(-self.max_step..=self.max_step);
            self.price = (self.price + delta).clamp(self.floor, self.ceiling);
        }
        self.price
    }
}

/// Run the synthetic feed until `cancel` fires or the sink detaches.
pub async fn run_mock_feed(config: MockFeedConfig, sink: StreamSink, cancel: CancellationToken) {
    tracing::info!(
        interval_ms = config.interval.as_millis(),
        "No API token configured, using synthetic prices"
    );

    if !sink.status(ConnectionState::Mock).await {
        return;
    }

    let mut walk = PriceWalk::new(&config);
    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::debug!("Synthetic feed stopped");
                return;
            }
            _ = ticker.tick() => {
                if !sink.quote(walk.step()).await {
                    return;
                }
            }
        }
    }
}
