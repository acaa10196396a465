use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::adapter::{NetworkStats, UpdatePayload, VenueAdapter, VenueUpdate};
use crate::queue::DropOldestQueue;
use crate::symbol::SymbolTable;
use crate::types::{Quote, Ticker};

/// Counters mirroring `DataReceiver`'s stats surface in the original
/// implementation: total accepted/rejected updates plus per-adapter network
/// counters aggregated on demand.
#[derive(Debug, Default)]
pub struct IngestionStats {
    pub quotes_accepted: AtomicU64,
    pub tickers_accepted: AtomicU64,
    pub rejected: AtomicU64,
}

/// Receives `VenueUpdate`s from every registered adapter, validates them,
/// and routes valid payloads into the bounded orderbook/ticker queues. This
/// is the single place that dispatches on the two adapter callback shapes.
pub struct IngestionStage {
    orderbook_queue: Arc<DropOldestQueue<Quote>>,
    ticker_queue: Arc<DropOldestQueue<Ticker>>,
    adapters: Vec<Arc<dyn VenueAdapter>>,
    stats: IngestionStats,
    symbol_table: Arc<SymbolTable>,
    watch_list: Vec<String>,
}

impl IngestionStage {
    pub fn new(
        orderbook_capacity: usize,
        ticker_capacity: usize,
        symbol_table: Arc<SymbolTable>,
        watch_list: Vec<String>,
    ) -> Self {
        Self {
            orderbook_queue: Arc::new(DropOldestQueue::new(orderbook_capacity)),
            ticker_queue: Arc::new(DropOldestQueue::new(ticker_capacity)),
            adapters: Vec::new(),
            stats: IngestionStats::default(),
            symbol_table,
            watch_list,
        }
    }

    pub fn register(&mut self, adapter: Arc<dyn VenueAdapter>) {
        self.adapters.push(adapter);
    }

    pub fn orderbook_queue(&self) -> Arc<DropOldestQueue<Quote>> {
        self.orderbook_queue.clone()
    }

    pub fn ticker_queue(&self) -> Arc<DropOldestQueue<Ticker>> {
        self.ticker_queue.clone()
    }

    pub fn adapters(&self) -> &[Arc<dyn VenueAdapter>] {
        &self.adapters
    }

    /// Handles one update regardless of which callback shape produced it.
    /// Translates the venue-native symbol to canonical form, rejects
    /// anything off the configured watch list, and rejects invalid quotes
    /// (spec §3's Quote invariants) — all without panicking.
    pub fn handle_update(&self, venue: &str, update: VenueUpdate) {
        let native_symbol = update.symbol().to_string();
        let canonical_symbol = self
            .symbol_table
            .to_canonical(venue, &native_symbol)
            .unwrap_or_else(|| native_symbol.clone());

        if !self.watch_list.contains(&canonical_symbol) {
            debug!(venue, symbol = %canonical_symbol, "rejected update for symbol off the watch list");
            self.stats.rejected.fetch_add(1, Ordering::Relaxed);
            return;
        }

        match update.into_payload() {
            UpdatePayload::Quote(mut quote) => {
                quote.symbol = canonical_symbol.clone();
                if !quote.is_valid() {
                    debug!(venue, symbol = %canonical_symbol, "rejected invalid quote");
                    self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                    return;
                }
                self.orderbook_queue.push(quote);
                self.stats.quotes_accepted.fetch_add(1, Ordering::Relaxed);
            }
            UpdatePayload::Ticker(mut ticker) => {
                ticker.symbol = canonical_symbol;
                self.ticker_queue.push(ticker);
                self.stats.tickers_accepted.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn stats(&self) -> &IngestionStats {
        &self.stats
    }

    /// Sums network/reconnect counters across every registered adapter,
    /// computed fresh on each call rather than cached.
    pub fn aggregate_stats(&self) -> (u64, u64, u64) {
        self.adapters.iter().map(|a| a.network_stats()).fold(
            (0, 0, 0),
            |(rx, tx, rc), stats| {
                let (r, t, c) = stats.snapshot();
                (rx + r, tx + t, rc + c)
            },
        )
    }
}

pub fn network_stats_for(adapter: &dyn VenueAdapter) -> &NetworkStats {
    adapter.network_stats()
}
