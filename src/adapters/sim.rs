use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::{mpsc, watch};
use tracing::info;

use crate::adapter::{NetworkStats, UpdatePayload, VenueAdapter, VenueUpdate};
use crate::error::AdapterError;
use crate::types::{Quote, Ticker};

/// Synthetic venue adapter for local demos and tests: generates a slowly
/// drifting random walk around a base price for each configured symbol,
/// with a small per-venue offset so spreads naturally appear between two
/// `SimAdapter`s pointed at the same symbol set.
pub struct SimAdapter {
    venue: String,
    symbols: Vec<String>,
    base_price: Decimal,
    offset_pct: Decimal,
    tick_interval: std::time::Duration,
    network_stats: NetworkStats,
}

impl SimAdapter {
    pub fn new(
        venue: impl Into<String>,
        symbols: Vec<String>,
        base_price: Decimal,
        offset_pct: Decimal,
        tick_interval: std::time::Duration,
    ) -> Self {
        Self {
            venue: venue.into(),
            symbols,
            base_price,
            offset_pct,
            tick_interval,
            network_stats: NetworkStats::default(),
        }
    }
}

#[async_trait]
impl VenueAdapter for SimAdapter {
    fn venue(&self) -> &str {
        &self.venue
    }

    fn network_stats(&self) -> &NetworkStats {
        &self.network_stats
    }

    async fn run(
        &self,
        sink: mpsc::Sender<VenueUpdate>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), AdapterError> {
        info!(venue = %self.venue, "sim adapter connected");
        let mut interval = tokio::time::interval(self.tick_interval);
        let mut seed: u64 = 0x9e3779b97f4a7c15 ^ self.venue.len() as u64;

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!(venue = %self.venue, "sim adapter shutting down");
                        return Ok(());
                    }
                }
            }
            if *shutdown.borrow() {
                return Ok(());
            }

            for symbol in &self.symbols {
                seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
                let jitter_bps = (seed >> 48) as i64 % 20 - 10;
                let mid = self.base_price
                    * (Decimal::ONE + self.offset_pct / Decimal::ONE_HUNDRED)
                    * (Decimal::ONE + Decimal::new(jitter_bps, 4));
                let half_spread = mid * Decimal::new(5, 4);

                let quote = Quote {
                    venue: self.venue.clone(),
                    symbol: symbol.clone(),
                    bid: mid - half_spread,
                    ask: mid + half_spread,
                    bid_size: Decimal::ONE,
                    ask_size: Decimal::ONE,
                    timestamp: Utc::now(),
                };
                self.network_stats.record_received(64);
                if sink
                    .send(VenueUpdate::Keyed {
                        symbol: symbol.clone(),
                        payload: UpdatePayload::Quote(quote),
                    })
                    .await
                    .is_err()
                {
                    return Ok(());
                }

                let ticker = Ticker {
                    venue: self.venue.clone(),
                    symbol: symbol.clone(),
                    mark_price: mid,
                    funding_rate_8h: Decimal::new(1, 4),
                    timestamp: Utc::now(),
                };
                if sink
                    .send(VenueUpdate::Embedded {
                        payload: UpdatePayload::Ticker(ticker),
                    })
                    .await
                    .is_err()
                {
                    return Ok(());
                }
            }
        }
    }
}

pub fn sim_pair(
    symbols: Vec<String>,
    base_price: Decimal,
) -> (Arc<dyn VenueAdapter>, Arc<dyn VenueAdapter>) {
    let interval = std::time::Duration::from_millis(250);
    let a = Arc::new(SimAdapter::new(
        "sim-a",
        symbols.clone(),
        base_price,
        Decimal::ZERO,
        interval,
    ));
    let b = Arc::new(SimAdapter::new(
        "sim-b",
        symbols,
        base_price,
        Decimal::new(5, 2),
        interval,
    ));
    (a, b)
}
