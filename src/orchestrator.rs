use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::adapter::VenueAdapter;
use crate::config::Config;
use crate::display::DisplayEngine;
use crate::history::storage::{HistoryRecorder, HistoryRecorderConfig, RetentionPolicy};
use crate::history::SamplingAccumulator;
use crate::ingestion::IngestionStage;
use crate::opportunity::OpportunityFinder;
use crate::processing::ProcessingStage;
use crate::spread::calculate_spreads;
use crate::state::StateStore;
use crate::symbol::SymbolTable;

/// Owns the full pipeline's lifecycle: wiring, the analysis loop, the
/// display refresh loop, and housekeeping. Mirrors the teacher's
/// "coordinator holds handles, each stage runs as its own task" shape.
pub struct Orchestrator {
    config: Config,
    ingestion: Arc<IngestionStage>,
    state: Arc<StateStore>,
    processing: Arc<ProcessingStage>,
    opportunity_finder: Arc<OpportunityFinder>,
    display: Arc<Mutex<DisplayEngine>>,
    history: Option<Arc<HistoryRecorder>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    /// One `run()` task handle per connected adapter, kept so `shutdown` can
    /// wait (bounded) for each to actually observe cancellation.
    adapter_tasks: Vec<(String, tokio::task::JoinHandle<()>)>,
}

impl Orchestrator {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        config.validate()?;

        let ingestion = Arc::new(IngestionStage::new(
            config.orderbook_queue_capacity,
            config.ticker_queue_capacity,
            Arc::new(SymbolTable::new()),
            config.symbols.clone(),
        ));
        let state = Arc::new(StateStore::new(config.data_timeout_secs));
        let processing = Arc::new(ProcessingStage::new(
            ingestion.orderbook_queue(),
            ingestion.ticker_queue(),
            state.clone(),
        ));

        let min_spread_pct =
            Decimal::from_f64(config.min_spread_pct).unwrap_or(Decimal::ZERO);
        let opportunity_finder = Arc::new(OpportunityFinder::new(min_spread_pct));

        let display = Arc::new(Mutex::new(DisplayEngine::new(
            config.display_continuation_tolerance_secs,
            config.display_post_disappearance_hold_secs,
            config.display_occurrence_window_secs,
            config.display_occurrence_dedup_secs,
        )));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            config,
            ingestion,
            state,
            processing,
            opportunity_finder,
            display,
            history: None,
            shutdown_tx,
            shutdown_rx,
            adapter_tasks: Vec::new(),
        })
    }

    pub fn register_adapter(&mut self, adapter: Arc<dyn VenueAdapter>) {
        Arc::get_mut(&mut self.ingestion)
            .expect("register_adapter must run before start")
            .register(adapter);
    }

    pub fn ingestion(&self) -> Arc<IngestionStage> {
        self.ingestion.clone()
    }

    pub fn state(&self) -> Arc<StateStore> {
        self.state.clone()
    }

    pub fn opportunity_finder(&self) -> Arc<OpportunityFinder> {
        self.opportunity_finder.clone()
    }

    pub fn display(&self) -> Arc<Mutex<DisplayEngine>> {
        self.display.clone()
    }

    /// Validates config, connects every adapter, and spawns every background
    /// task. Returns an error (without partially starting) if any adapter
    /// fails to connect — the only failure this crate treats as fatal.
    pub async fn start(&mut self) -> anyhow::Result<()> {
        info!(exchanges = ?self.config.exchanges, symbols = ?self.config.symbols, "starting arbitrage monitor");

        self.connect_adapters().await?;

        self.history = Some(Arc::new(HistoryRecorder::spawn(HistoryRecorderConfig {
            db_path: self.config.history_db_path.clone().into(),
            queue_capacity: self.config.history_write_queue_capacity,
            batch_size: self.config.history_batch_size,
            batch_timeout: std::time::Duration::from_millis(self.config.history_batch_timeout_ms),
            csv_archive_enabled: self.config.history_csv_archive_enabled,
            csv_archive_dir: self.config.history_csv_archive_dir.clone().into(),
        })?));

        for adapter in self.ingestion.adapters().to_vec() {
            let venue = adapter.venue().to_string();
            let (tx, mut rx) = tokio::sync::mpsc::channel(256);
            let shutdown_rx = self.shutdown_rx.clone();
            let adapter_for_task = adapter.clone();
            let run_handle = tokio::spawn(async move {
                if let Err(err) = adapter_for_task.run(tx, shutdown_rx).await {
                    warn!(venue = %venue, error = %err, "adapter exited with error");
                }
            });
            self.adapter_tasks.push((adapter.venue().to_string(), run_handle));

            let ingestion = self.ingestion.clone();
            let venue_name = adapter.venue().to_string();
            tokio::spawn(async move {
                while let Some(update) = rx.recv().await {
                    ingestion.handle_update(&venue_name, update);
                }
            });
        }

        let processing = self.processing.clone();
        let shutdown_rx = self.shutdown_rx.clone();
        tokio::spawn(async move { processing.run(shutdown_rx).await });

        self.spawn_analysis_loop();
        self.spawn_display_refresh();
        self.spawn_housekeeping();

        Ok(())
    }

    /// Awaits every registered adapter's `connect` concurrently. If any one
    /// fails, the whole startup aborts before any steady-state task spawns —
    /// no partial-adapter-set operation.
    async fn connect_adapters(&self) -> anyhow::Result<()> {
        let handles: Vec<_> = self
            .ingestion
            .adapters()
            .iter()
            .cloned()
            .map(|adapter| {
                tokio::spawn(async move {
                    let venue = adapter.venue().to_string();
                    adapter.connect().await.map_err(|err| (venue, err))
                })
            })
            .collect();

        let mut failures = Vec::new();
        for handle in handles {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err((venue, err))) => failures.push(format!("{venue}: {err}")),
                Err(join_err) => failures.push(format!("adapter connect task panicked: {join_err}")),
            }
        }

        if !failures.is_empty() {
            anyhow::bail!("adapter connect failed: {}", failures.join(", "));
        }
        Ok(())
    }

    /// Pure compute/update loop: recomputes spreads, updates tracked
    /// opportunities, and feeds the history sampler. Runs independently of
    /// the display refresh loop, at `analysis_loop_interval_ms`.
    fn spawn_analysis_loop(&self) {
        let state = self.state.clone();
        let opportunity_finder = self.opportunity_finder.clone();
        let history = self.history.clone();
        let config = self.config.clone();
        let mut shutdown_rx = self.shutdown_rx.clone();
        let mut accumulator =
            SamplingAccumulator::new(config.history_bucket_interval_secs, config.history_reducer);

        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_millis(config.analysis_loop_interval_ms));
            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            return;
                        }
                    }
                }
                if *shutdown_rx.borrow() {
                    return;
                }

                let now = chrono::Utc::now();
                let mut symbol_spreads = HashMap::new();

                for symbol in config.symbols.iter() {
                    let quotes: Vec<_> = state.quotes_for_symbol(symbol, now).into_values().collect();
                    if quotes.len() < 2 {
                        symbol_spreads.insert(symbol.clone(), Decimal::ZERO);
                        continue;
                    }

                    let mut tickers = HashMap::new();
                    for venue in config.exchanges.iter() {
                        if let Some(ticker) = state.ticker(venue, symbol, now) {
                            tickers.insert(venue.clone(), ticker);
                        }
                    }

                    let spreads = calculate_spreads(symbol, &quotes, now);
                    let best = crate::spread::best_spread_pct(&spreads);
                    symbol_spreads.insert(symbol.clone(), best);

                    for spread in &spreads {
                        let funding_rate_diff_8h = match (
                            tickers.get(&spread.venue_buy),
                            tickers.get(&spread.venue_sell),
                        ) {
                            (Some(buy), Some(sell)) => Some(sell.funding_rate_8h - buy.funding_rate_8h),
                            _ => None,
                        };
                        accumulator.record(spread, funding_rate_diff_8h);
                    }

                    opportunity_finder.update(&spreads, &tickers, now);
                }

                if let Some(history) = &history {
                    for record in accumulator.flush_elapsed(now) {
                        history.record(record);
                    }
                }
            }
        });
    }

    /// Pushes the Opportunity Finder's current active set into the Display
    /// Engine on its own cadence, at `ui_refresh_interval_ms`, independent of
    /// how often the analysis loop recomputes opportunities.
    fn spawn_display_refresh(&self) {
        let opportunity_finder = self.opportunity_finder.clone();
        let display = self.display.clone();
        let interval_ms = self.config.ui_refresh_interval_ms;
        let mut shutdown_rx = self.shutdown_rx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_millis(interval_ms));
            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            return;
                        }
                    }
                }
                if *shutdown_rx.borrow() {
                    return;
                }

                let now = chrono::Utc::now();
                let active = opportunity_finder.active();
                display.lock().update(&active, now);
            }
        });
    }

    fn spawn_housekeeping(&self) {
        let retention = RetentionPolicy::new(
            self.config.history_compress_after_days,
            self.config.history_archive_after_days,
        );
        let interval_secs = self.config.history_cleanup_interval_secs;
        let mut shutdown_rx = self.shutdown_rx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            return;
                        }
                    }
                }
                if *shutdown_rx.borrow() {
                    return;
                }
                let (compress_cutoff, archive_cutoff) = retention.cutoffs(chrono::Utc::now());
                info!(%compress_cutoff, %archive_cutoff, "retention housekeeping pass");
            }
        });
    }

    /// Signals every task to stop, waits up to 3s per adapter for its `run`
    /// task to observe the shutdown signal and exit, then waits up to
    /// `shutdown_timeout_secs` for the history recorder's durable flush.
    pub async fn shutdown(&mut self) {
        let _ = self.shutdown_tx.send(true);

        let disconnect_timeout = std::time::Duration::from_secs(3);
        for (venue, handle) in self.adapter_tasks.drain(..) {
            if tokio::time::timeout(disconnect_timeout, handle).await.is_err() {
                warn!(%venue, "adapter did not disconnect within timeout");
            }
        }

        if let Some(history) = &self.history {
            let timeout = std::time::Duration::from_secs(self.config.shutdown_timeout_secs);
            let _ = tokio::time::timeout(timeout, history.shutdown()).await;
        }
    }
}
