use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::error;

use crate::queue::DropOldestQueue;
use crate::state::StateStore;
use crate::types::{Quote, Ticker};

const DRAIN_BATCH_SIZE: usize = 50;
const THROUGHPUT_WINDOW: chrono::Duration = chrono::Duration::hours(1);

/// Drains the orderbook/ticker queues in batches and writes the results into
/// the State Store. Failures here are narrow (the queues only ever carry
/// already-validated values) but the counter exists so a future malformed
/// payload doesn't silently vanish.
pub struct ProcessingStage {
    orderbook_queue: Arc<DropOldestQueue<Quote>>,
    ticker_queue: Arc<DropOldestQueue<Ticker>>,
    state: Arc<StateStore>,
    processing_errors: AtomicU64,
    /// Receive timestamps for every applied entry over the trailing hour,
    /// pruned on each drain pass, backing throughput reporting.
    receive_log: Mutex<VecDeque<DateTime<Utc>>>,
}

impl ProcessingStage {
    pub fn new(
        orderbook_queue: Arc<DropOldestQueue<Quote>>,
        ticker_queue: Arc<DropOldestQueue<Ticker>>,
        state: Arc<StateStore>,
    ) -> Self {
        Self {
            orderbook_queue,
            ticker_queue,
            state,
            processing_errors: AtomicU64::new(0),
            receive_log: Mutex::new(VecDeque::new()),
        }
    }

    /// Drains up to `DRAIN_BATCH_SIZE` quotes and tickers each, writing valid
    /// entries into the State Store. Returns the number of entries applied.
    pub fn drain_once(&self) -> usize {
        let mut applied = 0;
        let now = Utc::now();

        for _ in 0..DRAIN_BATCH_SIZE {
            match self.orderbook_queue.try_pop() {
                Some(quote) => {
                    self.state.update_quote(quote);
                    applied += 1;
                }
                None => break,
            }
        }

        for _ in 0..DRAIN_BATCH_SIZE {
            match self.ticker_queue.try_pop() {
                Some(ticker) => {
                    self.state.update_ticker(ticker);
                    applied += 1;
                }
                None => break,
            }
        }

        if applied > 0 {
            let mut log = self.receive_log.lock();
            for _ in 0..applied {
                log.push_back(now);
            }
            prune_receive_log(&mut log, now);
        }

        applied
    }

    pub fn record_error(&self, venue: &str, symbol: &str, reason: &str) {
        error!(venue, symbol, reason, "processing error");
        self.processing_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn processing_errors(&self) -> u64 {
        self.processing_errors.load(Ordering::Relaxed)
    }

    /// Number of entries applied within the trailing hour, for a
    /// messages/sec throughput figure. Prunes the log as a side effect.
    pub fn throughput_last_hour(&self, now: DateTime<Utc>) -> usize {
        let mut log = self.receive_log.lock();
        prune_receive_log(&mut log, now);
        log.len()
    }

    /// Runs `drain_once` in a loop until `shutdown` fires, sleeping briefly
    /// between empty passes to avoid a busy spin.
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                return;
            }
            let applied = self.drain_once();
            if applied == 0 {
                tokio::select! {
                    _ = tokio::time::sleep(std::time::Duration::from_millis(1)) => {}
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            return;
                        }
                    }
                }
            }
        }
    }
}

fn prune_receive_log(log: &mut VecDeque<DateTime<Utc>>, now: DateTime<Utc>) {
    let cutoff = now - THROUGHPUT_WINDOW;
    while matches!(log.front(), Some(ts) if *ts < cutoff) {
        log.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn drains_queued_quotes_into_state_store() {
        let orderbook = Arc::new(DropOldestQueue::new(10));
        let ticker = Arc::new(DropOldestQueue::new(10));
        let state = Arc::new(StateStore::new(30));
        let stage = ProcessingStage::new(orderbook.clone(), ticker.clone(), state.clone());

        let now = Utc::now();
        orderbook.push(Quote {
            venue: "binance".to_string(),
            symbol: "BTC-USD-PERP".to_string(),
            bid: dec!(100),
            ask: dec!(100.1),
            bid_size: dec!(1),
            ask_size: dec!(1),
            timestamp: now,
        });

        assert_eq!(stage.drain_once(), 1);
        assert!(state.quote("binance", "BTC-USD-PERP", now).is_some());
    }

    #[test]
    fn throughput_counts_entries_within_the_trailing_hour() {
        let orderbook = Arc::new(DropOldestQueue::new(10));
        let ticker = Arc::new(DropOldestQueue::new(10));
        let state = Arc::new(StateStore::new(30));
        let stage = ProcessingStage::new(orderbook.clone(), ticker.clone(), state);

        let now = Utc::now();
        orderbook.push(Quote {
            venue: "binance".to_string(),
            symbol: "BTC-USD-PERP".to_string(),
            bid: dec!(100),
            ask: dec!(100.1),
            bid_size: dec!(1),
            ask_size: dec!(1),
            timestamp: now,
        });
        stage.drain_once();

        assert_eq!(stage.throughput_last_hour(now), 1);
        assert_eq!(stage.throughput_last_hour(now + chrono::Duration::hours(2)), 0);
    }
}
