use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use crate::error::AdapterError;
use crate::types::{Quote, Ticker};

/// A single market-data update pushed by a venue adapter into the Ingestion
/// Stage. Venues differ in whether the symbol travels alongside the payload
/// or is embedded inside it (Lighter/EdgeX-style); this enum makes both
/// shapes explicit instead of normalizing them away in the adapter itself,
/// so the Ingestion Stage is the single place that dispatches on shape.
#[derive(Debug, Clone)]
pub enum VenueUpdate {
    /// `callback(symbol, payload)`: the venue's own client invokes the
    /// registered callback with the symbol as a separate argument.
    Keyed { symbol: String, payload: UpdatePayload },
    /// `callback(payload)`: the symbol is embedded in the payload itself.
    Embedded { payload: UpdatePayload },
}

#[derive(Debug, Clone)]
pub enum UpdatePayload {
    Quote(Quote),
    Ticker(Ticker),
}

impl VenueUpdate {
    /// Extracts the effective symbol regardless of which shape produced it.
    pub fn symbol(&self) -> &str {
        match self {
            VenueUpdate::Keyed { symbol, .. } => symbol,
            VenueUpdate::Embedded { payload } => match payload {
                UpdatePayload::Quote(q) => &q.symbol,
                UpdatePayload::Ticker(t) => &t.symbol,
            },
        }
    }

    pub fn into_payload(self) -> UpdatePayload {
        match self {
            VenueUpdate::Keyed { payload, .. } => payload,
            VenueUpdate::Embedded { payload } => payload,
        }
    }
}

#[derive(Debug, Default)]
pub struct NetworkStats {
    pub bytes_received: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub reconnect_count: AtomicU64,
}

impl NetworkStats {
    pub fn record_received(&self, bytes: u64) {
        self.bytes_received.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_sent(&self, bytes: u64) {
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_reconnect(&self) {
        self.reconnect_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> (u64, u64, u64) {
        (
            self.bytes_received.load(Ordering::Relaxed),
            self.bytes_sent.load(Ordering::Relaxed),
            self.reconnect_count.load(Ordering::Relaxed),
        )
    }
}

/// The contract every venue adapter implements. Adapters own their own I/O
/// context (one per venue, spec §5) and push updates into the sink they are
/// handed at `run` time; they never block on a full queue themselves — that
/// policy lives in the sink implementation (`DropOldestQueue`).
#[async_trait]
pub trait VenueAdapter: Send + Sync {
    fn venue(&self) -> &str;

    fn network_stats(&self) -> &NetworkStats;

    /// Establishes the venue connection (auth, handshake, subscription setup)
    /// before `run` starts streaming. The orchestrator awaits this for every
    /// registered adapter during startup and aborts the whole startup if any
    /// one of them fails — adapters with nothing to do up front can rely on
    /// the default no-op.
    async fn connect(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    /// Streams updates to `sink` until cancelled via `shutdown` or a fatal
    /// connection error occurs. Assumes `connect` has already succeeded.
    async fn run(
        &self,
        sink: tokio::sync::mpsc::Sender<VenueUpdate>,
        shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> Result<(), AdapterError>;
}
