use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

use crate::types::{Quote, Ticker};

/// Latest known quote and ticker for one `(venue, symbol)` pair. Stored
/// behind an `ArcSwap` so updates to an existing key never take a lock: the
/// outer `RwLock` is only write-locked the first time a new key appears.
struct Entry {
    quote: ArcSwap<Option<Quote>>,
    ticker: ArcSwap<Option<Ticker>>,
}

impl Default for Entry {
    fn default() -> Self {
        Self {
            quote: ArcSwap::from_pointee(None),
            ticker: ArcSwap::from_pointee(None),
        }
    }
}

/// Single-writer-per-key, many-reader state store. Writers are the
/// Processing Stage; readers are the analysis loop, Display Engine, and
/// History Recorder. Staleness (spec: 30s default) is a read-time filter
/// only — stale entries are retained, not evicted.
pub struct StateStore {
    entries: RwLock<HashMap<(String, String), Arc<Entry>>>,
    staleness: Duration,
}

impl StateStore {
    pub fn new(staleness_secs: u64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            staleness: Duration::seconds(staleness_secs as i64),
        }
    }

    fn entry(&self, venue: &str, symbol: &str) -> Arc<Entry> {
        let key = (venue.to_string(), symbol.to_string());
        if let Some(entry) = self.entries.read().get(&key) {
            return entry.clone();
        }
        self.entries
            .write()
            .entry(key)
            .or_insert_with(|| Arc::new(Entry::default()))
            .clone()
    }

    pub fn update_quote(&self, quote: Quote) {
        let entry = self.entry(&quote.venue, &quote.symbol);
        entry.quote.store(Arc::new(Some(quote)));
    }

    pub fn update_ticker(&self, ticker: Ticker) {
        let entry = self.entry(&ticker.venue, &ticker.symbol);
        entry.ticker.store(Arc::new(Some(ticker)));
    }

    fn is_fresh(&self, timestamp: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now - timestamp <= self.staleness
    }

    /// Returns the latest quote for `(venue, symbol)` if present and fresh
    /// as of `now`.
    pub fn quote(&self, venue: &str, symbol: &str, now: DateTime<Utc>) -> Option<Quote> {
        let entries = self.entries.read();
        let entry = entries.get(&(venue.to_string(), symbol.to_string()))?.clone();
        drop(entries);
        let quote = (**entry.quote.load()).clone()?;
        self.is_fresh(quote.timestamp, now).then_some(quote)
    }

    pub fn ticker(&self, venue: &str, symbol: &str, now: DateTime<Utc>) -> Option<Ticker> {
        let entries = self.entries.read();
        let entry = entries.get(&(venue.to_string(), symbol.to_string()))?.clone();
        drop(entries);
        let ticker = (**entry.ticker.load()).clone()?;
        self.is_fresh(ticker.timestamp, now).then_some(ticker)
    }

    /// Snapshot of every fresh quote for `symbol`, keyed by venue.
    pub fn quotes_for_symbol(&self, symbol: &str, now: DateTime<Utc>) -> HashMap<String, Quote> {
        let entries = self.entries.read();
        let mut out = HashMap::new();
        for ((venue, sym), entry) in entries.iter() {
            if sym != symbol {
                continue;
            }
            if let Some(quote) = (**entry.quote.load()).clone() {
                if self.is_fresh(quote.timestamp, now) {
                    out.insert(venue.clone(), quote);
                }
            }
        }
        out
    }

    pub fn known_symbols(&self) -> Vec<String> {
        let entries = self.entries.read();
        let mut symbols: Vec<String> = entries.keys().map(|(_, s)| s.clone()).collect();
        symbols.sort();
        symbols.dedup();
        symbols
    }
}
