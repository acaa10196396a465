use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Canonical venue identifier, e.g. "binance", "lighter", "edgex".
pub type Venue = String;

/// Canonical symbol, normalized to `BASE-QUOTE-PERP` (see `symbol.rs`).
pub type Symbol = String;

/// A single top-of-book quote received from a venue adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub venue: Venue,
    pub symbol: Symbol,
    pub bid: Decimal,
    pub ask: Decimal,
    pub bid_size: Decimal,
    pub ask_size: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl Quote {
    pub fn mid(&self) -> Decimal {
        (self.bid + self.ask) / Decimal::TWO
    }

    pub fn is_valid(&self) -> bool {
        self.bid > Decimal::ZERO
            && self.ask > Decimal::ZERO
            && self.bid < self.ask
            && self.bid_size > Decimal::ZERO
            && self.ask_size > Decimal::ZERO
    }
}

/// Funding-rate / mark-price information for a perpetual contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub venue: Venue,
    pub symbol: Symbol,
    pub mark_price: Decimal,
    /// Funding rate for the venue's native funding interval (commonly 8h).
    pub funding_rate_8h: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// A positive cross-venue spread for one symbol and direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spread {
    pub symbol: Symbol,
    pub venue_buy: Venue,
    pub venue_sell: Venue,
    pub price_buy: Decimal,
    pub price_sell: Decimal,
    pub size_buy: Decimal,
    pub size_sell: Decimal,
    pub spread_abs: Decimal,
    pub spread_pct: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// A tracked arbitrage opportunity, keyed by (symbol, venue_buy, venue_sell).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub symbol: Symbol,
    pub venue_buy: Venue,
    pub venue_sell: Venue,
    pub price_buy: Decimal,
    pub price_sell: Decimal,
    pub size_buy: Decimal,
    pub size_sell: Decimal,
    pub spread_abs: Decimal,
    pub spread_pct: Decimal,
    pub funding_rate_buy: Option<Decimal>,
    pub funding_rate_sell: Option<Decimal>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Seconds this opportunity has been continuously tracked by the
    /// Opportunity Finder, independent of the Display Engine's own
    /// continuation-tolerance duration (see `display::DisplayEngine::duration`).
    pub duration_seconds: i64,
    /// `funding_rate_sell - funding_rate_buy`, signed, 8h basis.
    pub funding_rate_diff_8h: Option<Decimal>,
}

impl Opportunity {
    pub fn key(&self) -> (Symbol, Venue, Venue) {
        (self.symbol.clone(), self.venue_buy.clone(), self.venue_sell.clone())
    }

    /// Annualized funding differential, computed once from the authoritative
    /// 8h value and never recomputed from a derived/lossy figure.
    pub fn funding_rate_diff_annualized_pct(&self) -> Option<Decimal> {
        self.funding_rate_diff_8h
            .map(|diff| diff * Decimal::from(1095) * Decimal::ONE_HUNDRED)
    }
}

/// A recorded occurrence of an opportunity for the 15-minute rolling counter.
#[derive(Debug, Clone, PartialEq)]
pub struct OccurrenceLogEntry {
    pub symbol: Symbol,
    pub venue_buy: Venue,
    pub venue_sell: Venue,
    pub at: DateTime<Utc>,
}

/// One wall-clock bucketed, reduced sample destined for persistent storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampledRecord {
    pub symbol: Symbol,
    pub venue_buy: Venue,
    pub venue_sell: Venue,
    pub bucket_start_time: DateTime<Utc>,
    pub price_buy: Decimal,
    pub price_sell: Decimal,
    pub size_buy: Decimal,
    pub size_sell: Decimal,
    pub spread_pct: Decimal,
    pub funding_rate_diff_8h: Option<Decimal>,
    pub funding_rate_diff_annual_pct: Option<Decimal>,
}
