use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;

use crate::types::{Opportunity, Spread, Ticker};

type OpportunityKey = (String, String, String);

/// Tracks live arbitrage opportunities keyed by `(symbol, venue_buy,
/// venue_sell)`. Creation and destruction are immediate at this layer — no
/// grace period — the Display Engine layers its own hysteresis on top.
pub struct OpportunityFinder {
    min_spread_pct: Decimal,
    opportunities: RwLock<HashMap<OpportunityKey, Opportunity>>,
    opportunities_found: AtomicU64,
    opportunities_expired: AtomicU64,
}

impl OpportunityFinder {
    pub fn new(min_spread_pct: Decimal) -> Self {
        Self {
            min_spread_pct,
            opportunities: RwLock::new(HashMap::new()),
            opportunities_found: AtomicU64::new(0),
            opportunities_expired: AtomicU64::new(0),
        }
    }

    /// Updates tracked opportunities from this tick's spreads. Spreads below
    /// `min_spread_pct` are treated as absent. Funding-rate diffs are
    /// attached from `tickers` (by venue) when both sides are known.
    pub fn update(
        &self,
        spreads: &[Spread],
        tickers: &HashMap<String, Ticker>,
        now: DateTime<Utc>,
    ) {
        let mut live_keys = Vec::with_capacity(spreads.len());

        for spread in spreads.iter().filter(|s| s.spread_pct >= self.min_spread_pct) {
            let key = (
                spread.symbol.clone(),
                spread.venue_buy.clone(),
                spread.venue_sell.clone(),
            );
            live_keys.push(key.clone());

            let buy_ticker = tickers.get(&spread.venue_buy);
            let sell_ticker = tickers.get(&spread.venue_sell);
            let funding_rate_buy = buy_ticker.map(|t| t.funding_rate_8h);
            let funding_rate_sell = sell_ticker.map(|t| t.funding_rate_8h);
            let funding_rate_diff_8h = match (buy_ticker, sell_ticker) {
                (Some(buy), Some(sell)) => Some(sell.funding_rate_8h - buy.funding_rate_8h),
                _ => None,
            };

            let mut opportunities = self.opportunities.write();
            match opportunities.get_mut(&key) {
                Some(existing) => {
                    existing.price_buy = spread.price_buy;
                    existing.price_sell = spread.price_sell;
                    existing.size_buy = spread.size_buy;
                    existing.size_sell = spread.size_sell;
                    existing.spread_abs = spread.spread_abs;
                    existing.spread_pct = spread.spread_pct;
                    existing.last_seen = now;
                    existing.duration_seconds = (now - existing.first_seen).num_seconds();
                    if funding_rate_buy.is_some() {
                        existing.funding_rate_buy = funding_rate_buy;
                    }
                    if funding_rate_sell.is_some() {
                        existing.funding_rate_sell = funding_rate_sell;
                    }
                    if funding_rate_diff_8h.is_some() {
                        existing.funding_rate_diff_8h = funding_rate_diff_8h;
                    }
                }
                None => {
                    opportunities.insert(
                        key,
                        Opportunity {
                            symbol: spread.symbol.clone(),
                            venue_buy: spread.venue_buy.clone(),
                            venue_sell: spread.venue_sell.clone(),
                            price_buy: spread.price_buy,
                            price_sell: spread.price_sell,
                            size_buy: spread.size_buy,
                            size_sell: spread.size_sell,
                            spread_abs: spread.spread_abs,
                            spread_pct: spread.spread_pct,
                            funding_rate_buy,
                            funding_rate_sell,
                            first_seen: now,
                            last_seen: now,
                            duration_seconds: 0,
                            funding_rate_diff_8h,
                        },
                    );
                    self.opportunities_found.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        let mut opportunities = self.opportunities.write();
        let expired: Vec<OpportunityKey> = opportunities
            .keys()
            .filter(|k| !live_keys.contains(k))
            .cloned()
            .collect();
        for key in expired {
            opportunities.remove(&key);
            self.opportunities_expired.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn active(&self) -> Vec<Opportunity> {
        self.opportunities.read().values().cloned().collect()
    }

    pub fn get_top_opportunities(&self, limit: usize) -> Vec<Opportunity> {
        let mut active = self.active();
        active.sort_by(|a, b| b.spread_pct.cmp(&a.spread_pct));
        active.truncate(limit);
        active
    }

    pub fn clear(&self) {
        self.opportunities.write().clear();
    }

    pub fn opportunities_found(&self) -> u64 {
        self.opportunities_found.load(Ordering::Relaxed)
    }

    pub fn opportunities_expired(&self) -> u64 {
        self.opportunities_expired.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn spread(pct: Decimal) -> Spread {
        let price_buy = dec!(100);
        let price_sell = dec!(100) + dec!(100) * pct / dec!(100);
        Spread {
            symbol: "BTC-USD-PERP".to_string(),
            venue_buy: "binance".to_string(),
            venue_sell: "lighter".to_string(),
            price_buy,
            price_sell,
            size_buy: dec!(1),
            size_sell: dec!(1),
            spread_abs: price_sell - price_buy,
            spread_pct: pct,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn creates_opportunity_above_threshold() {
        let finder = OpportunityFinder::new(dec!(0.05));
        let now = Utc::now();
        finder.update(&[spread(dec!(0.1))], &HashMap::new(), now);
        assert_eq!(finder.active().len(), 1);
        assert_eq!(finder.opportunities_found(), 1);
    }

    #[test]
    fn below_threshold_spread_creates_nothing() {
        let finder = OpportunityFinder::new(dec!(0.05));
        finder.update(&[spread(dec!(0.01))], &HashMap::new(), Utc::now());
        assert!(finder.active().is_empty());
    }

    #[test]
    fn disappearing_spread_expires_immediately() {
        let finder = OpportunityFinder::new(dec!(0.05));
        let now = Utc::now();
        finder.update(&[spread(dec!(0.1))], &HashMap::new(), now);
        finder.update(&[], &HashMap::new(), now);
        assert!(finder.active().is_empty());
        assert_eq!(finder.opportunities_expired(), 1);
    }

    #[test]
    fn funding_rate_diff_is_sell_minus_buy() {
        let finder = OpportunityFinder::new(dec!(0.05));
        let mut tickers = HashMap::new();
        tickers.insert(
            "binance".to_string(),
            Ticker {
                venue: "binance".to_string(),
                symbol: "BTC-USD-PERP".to_string(),
                mark_price: dec!(100),
                funding_rate_8h: dec!(0.0001),
                timestamp: Utc::now(),
            },
        );
        tickers.insert(
            "lighter".to_string(),
            Ticker {
                venue: "lighter".to_string(),
                symbol: "BTC-USD-PERP".to_string(),
                mark_price: dec!(100),
                funding_rate_8h: dec!(0.0005),
                timestamp: Utc::now(),
            },
        );
        finder.update(&[spread(dec!(0.1))], &tickers, Utc::now());
        let active = finder.active();
        assert_eq!(active[0].funding_rate_diff_8h, Some(dec!(0.0004)));
    }
}
