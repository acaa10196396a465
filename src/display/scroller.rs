use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// A single line destined for the realtime scroller pane.
#[derive(Debug, Clone, PartialEq)]
pub enum ScrollerLine {
    OrderbookUpdate {
        venue: String,
        symbol: String,
        mid: Decimal,
        at: DateTime<Utc>,
    },
    NewOpportunity {
        symbol: String,
        venue_buy: String,
        venue_sell: String,
        spread_pct: Decimal,
        at: DateTime<Utc>,
    },
}

/// Bounded ring buffer feeding the realtime scroller, with the rate-limiting
/// rules spec'd for each line kind. The original implementation double-calls
/// the scroller for a single new opportunity (spec design note); this
/// implementation's `push_new_opportunity` emits exactly one line per event.
pub struct Scroller {
    capacity: usize,
    lines: VecDeque<ScrollerLine>,
    last_push_at: Option<DateTime<Utc>>,
    global_throttle: chrono::Duration,
    mid_price_change_threshold_pct: Decimal,
    last_mid_by_key: HashMap<(String, String), Decimal>,
    new_opportunity_dedup: chrono::Duration,
    last_new_opportunity_by_symbol: HashMap<String, DateTime<Utc>>,
}

impl Scroller {
    pub fn new(
        capacity: usize,
        throttle_ms: u64,
        mid_price_change_threshold_pct: Decimal,
        new_opportunity_dedup_secs: u64,
    ) -> Self {
        Self {
            capacity,
            lines: VecDeque::with_capacity(capacity),
            last_push_at: None,
            global_throttle: chrono::Duration::milliseconds(throttle_ms as i64),
            mid_price_change_threshold_pct,
            last_mid_by_key: HashMap::new(),
            new_opportunity_dedup: chrono::Duration::seconds(new_opportunity_dedup_secs as i64),
            last_new_opportunity_by_symbol: HashMap::new(),
        }
    }

    fn push(&mut self, line: ScrollerLine, at: DateTime<Utc>) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
        self.last_push_at = Some(at);
    }

    fn within_global_throttle(&self, at: DateTime<Utc>) -> bool {
        matches!(self.last_push_at, Some(last) if at - last < self.global_throttle)
    }

    /// Pushes an orderbook-mid-price line, subject to the global throttle
    /// and the per-venue/symbol minimum mid-price change threshold.
    pub fn push_orderbook_update(
        &mut self,
        venue: &str,
        symbol: &str,
        mid: Decimal,
        at: DateTime<Utc>,
    ) {
        if self.within_global_throttle(at) {
            return;
        }
        let key = (venue.to_string(), symbol.to_string());
        if let Some(&last_mid) = self.last_mid_by_key.get(&key) {
            if last_mid != Decimal::ZERO {
                let change_pct = ((mid - last_mid) / last_mid * Decimal::ONE_HUNDRED).abs();
                if change_pct < self.mid_price_change_threshold_pct {
                    return;
                }
            }
        }
        self.last_mid_by_key.insert(key, mid);
        self.push(
            ScrollerLine::OrderbookUpdate {
                venue: venue.to_string(),
                symbol: symbol.to_string(),
                mid,
                at,
            },
            at,
        );
    }

    /// Pushes a new-opportunity line exactly once per event, subject to a
    /// per-symbol dedup window.
    pub fn push_new_opportunity(
        &mut self,
        symbol: &str,
        venue_buy: &str,
        venue_sell: &str,
        spread_pct: Decimal,
        at: DateTime<Utc>,
    ) {
        if let Some(&last) = self.last_new_opportunity_by_symbol.get(symbol) {
            if at - last < self.new_opportunity_dedup {
                return;
            }
        }
        self.last_new_opportunity_by_symbol
            .insert(symbol.to_string(), at);
        self.push(
            ScrollerLine::NewOpportunity {
                symbol: symbol.to_string(),
                venue_buy: venue_buy.to_string(),
                venue_sell: venue_sell.to_string(),
                spread_pct,
                at,
            },
            at,
        );
    }

    pub fn lines(&self) -> impl Iterator<Item = &ScrollerLine> {
        self.lines.iter()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }
}
