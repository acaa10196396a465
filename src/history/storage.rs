use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::error::HistoryError;
use crate::types::SampledRecord;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS spread_history_sampled (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    symbol TEXT NOT NULL,
    venue_buy TEXT NOT NULL,
    venue_sell TEXT NOT NULL,
    bucket_start_time INTEGER NOT NULL,
    price_buy TEXT NOT NULL,
    price_sell TEXT NOT NULL,
    size_buy TEXT NOT NULL,
    size_sell TEXT NOT NULL,
    spread_pct TEXT NOT NULL,
    funding_rate_diff_8h TEXT,
    funding_rate_diff_annual_pct TEXT
);
CREATE INDEX IF NOT EXISTS idx_spread_history_symbol_bucket
    ON spread_history_sampled (symbol, bucket_start_time);
CREATE INDEX IF NOT EXISTS idx_spread_history_bucket
    ON spread_history_sampled (bucket_start_time);
";

enum WriterMessage {
    Record(SampledRecord),
    Flush,
    Shutdown,
}

#[derive(Debug, Default)]
pub struct HistoryStats {
    pub records_written: AtomicU64,
    pub records_dropped: AtomicU64,
    pub batches_flushed: AtomicU64,
}

/// Background batched SQLite writer for sampled spread history, modeled on
/// the teacher's `AsyncBookRecorder`: a bounded channel feeds a single
/// writer task that batches by size or timeout and flushes durably on
/// shutdown.
///
/// Unlike every other queue in this crate, overflow here drops the *newest*
/// record rather than the oldest: an already-queued older sample is more
/// valuable to the history than the record that just arrived.
pub struct HistoryRecorder {
    tx: mpsc::Sender<WriterMessage>,
    stats: Arc<HistoryStats>,
}

pub struct HistoryRecorderConfig {
    pub db_path: PathBuf,
    pub queue_capacity: usize,
    pub batch_size: usize,
    pub batch_timeout: std::time::Duration,
    pub csv_archive_enabled: bool,
    pub csv_archive_dir: PathBuf,
}

impl HistoryRecorder {
    pub fn spawn(config: HistoryRecorderConfig) -> Result<Self, HistoryError> {
        let conn = Connection::open(&config.db_path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;",
        )?;
        conn.execute_batch(SCHEMA)?;

        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let stats = Arc::new(HistoryStats::default());
        let writer_stats = stats.clone();

        tokio::spawn(run_writer(conn, rx, config, writer_stats));

        Ok(Self { tx, stats })
    }

    /// Non-blocking: drops the new record and counts it if the queue is full.
    pub fn record(&self, record: SampledRecord) {
        if self.tx.try_send(WriterMessage::Record(record.clone())).is_err() {
            self.stats.records_dropped.fetch_add(1, Ordering::Relaxed);
            warn!(symbol = %record.symbol, "history write-intent queue full, dropped newest record");
        }
    }

    pub async fn flush(&self) {
        let _ = self.tx.send(WriterMessage::Flush).await;
    }

    pub async fn shutdown(&self) {
        let _ = self.tx.send(WriterMessage::Shutdown).await;
    }

    pub fn stats(&self) -> &HistoryStats {
        &self.stats
    }
}

async fn run_writer(
    conn: Connection,
    mut rx: mpsc::Receiver<WriterMessage>,
    config: HistoryRecorderConfig,
    stats: Arc<HistoryStats>,
) {
    let mut buffer: Vec<SampledRecord> = Vec::with_capacity(config.batch_size);
    let mut csv_archiver = config
        .csv_archive_enabled
        .then(|| CsvArchiver::new(config.csv_archive_dir.clone()));
    let mut timer = tokio::time::interval(config.batch_timeout);
    timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            message = rx.recv() => {
                match message {
                    Some(WriterMessage::Record(record)) => {
                        buffer.push(record);
                        if buffer.len() >= config.batch_size {
                            flush_batch(&conn, &mut buffer, &mut csv_archiver, &stats);
                        }
                    }
                    Some(WriterMessage::Flush) => {
                        flush_batch(&conn, &mut buffer, &mut csv_archiver, &stats);
                    }
                    Some(WriterMessage::Shutdown) | None => {
                        flush_batch(&conn, &mut buffer, &mut csv_archiver, &stats);
                        return;
                    }
                }
            }
            _ = timer.tick() => {
                flush_batch(&conn, &mut buffer, &mut csv_archiver, &stats);
            }
        }
    }
}

fn flush_batch(
    conn: &Connection,
    buffer: &mut Vec<SampledRecord>,
    csv_archiver: &mut Option<CsvArchiver>,
    stats: &HistoryStats,
) {
    if buffer.is_empty() {
        return;
    }

    match write_batch(conn, buffer) {
        Ok(count) => {
            stats.records_written.fetch_add(count as u64, Ordering::Relaxed);
            stats.batches_flushed.fetch_add(1, Ordering::Relaxed);
            info!(count, "flushed sampled spread history batch");
        }
        Err(err) => {
            warn!(error = %err, "failed to flush sampled spread history batch");
        }
    }

    if let Some(archiver) = csv_archiver {
        for record in buffer.iter() {
            if let Err(err) = archiver.append(record) {
                warn!(error = %err, "failed to archive record to csv");
            }
        }
    }

    buffer.clear();
}

fn write_batch(conn: &Connection, records: &[SampledRecord]) -> Result<usize, HistoryError> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare_cached(
            "INSERT INTO spread_history_sampled
                (symbol, venue_buy, venue_sell, bucket_start_time, price_buy, price_sell,
                 size_buy, size_sell, spread_pct, funding_rate_diff_8h, funding_rate_diff_annual_pct)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        )?;
        for record in records {
            stmt.execute(rusqlite::params![
                record.symbol,
                record.venue_buy,
                record.venue_sell,
                record.bucket_start_time.timestamp(),
                record.price_buy.to_string(),
                record.price_sell.to_string(),
                record.size_buy.to_string(),
                record.size_sell.to_string(),
                record.spread_pct.to_string(),
                record.funding_rate_diff_8h.map(|d| d.to_string()),
                record.funding_rate_diff_annual_pct.map(|d| d.to_string()),
            ])?;
        }
    }
    tx.commit()?;
    Ok(records.len())
}

/// Lazily-opened per-UTC-day CSV writer, shared by every symbol for that day.
struct CsvArchiver {
    dir: PathBuf,
    current_day: Option<chrono::NaiveDate>,
    file: Option<std::fs::File>,
}

impl CsvArchiver {
    fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            current_day: None,
            file: None,
        }
    }

    fn append(&mut self, record: &SampledRecord) -> std::io::Result<()> {
        let day = record.bucket_start_time.date_naive();
        if self.current_day != Some(day) {
            std::fs::create_dir_all(&self.dir)?;
            let path = self.dir.join(format!("spread_history_{day}.csv"));
            let is_new = !path.exists();
            let mut file = OpenOptions::new().create(true).append(true).open(path)?;
            if is_new {
                writeln!(
                    file,
                    "symbol,venue_buy,venue_sell,bucket_start_time,price_buy,price_sell,\
                     size_buy,size_sell,spread_pct,funding_rate_diff_8h,funding_rate_diff_annual_pct"
                )?;
            }
            self.file = Some(file);
            self.current_day = Some(day);
        }

        if let Some(file) = &mut self.file {
            writeln!(
                file,
                "{},{},{},{},{},{},{},{},{},{},{}",
                record.symbol,
                record.venue_buy,
                record.venue_sell,
                record.bucket_start_time.to_rfc3339(),
                record.price_buy,
                record.price_sell,
                record.size_buy,
                record.size_sell,
                record.spread_pct,
                record.funding_rate_diff_8h.map(|d| d.to_string()).unwrap_or_default(),
                record
                    .funding_rate_diff_annual_pct
                    .map(|d| d.to_string())
                    .unwrap_or_default(),
            )?;
        }
        Ok(())
    }
}

/// Retention housekeeping: logs compress/archive actions against their
/// configured age thresholds. The relational store itself is never pruned
/// (spec requirement) — only CSV archival state is touched here.
pub struct RetentionPolicy {
    pub compress_after: chrono::Duration,
    pub archive_after: chrono::Duration,
}

impl RetentionPolicy {
    pub fn new(compress_after_days: u64, archive_after_days: u64) -> Self {
        Self {
            compress_after: chrono::Duration::days(compress_after_days as i64),
            archive_after: chrono::Duration::days(archive_after_days as i64),
        }
    }

    /// Returns the cutoff timestamps a housekeeping pass should act on.
    pub fn cutoffs(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        (now - self.compress_after, now - self.archive_after)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration as StdDuration;

    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    use super::*;

    fn sample(symbol: &str, bucket: DateTime<Utc>) -> SampledRecord {
        SampledRecord {
            symbol: symbol.to_string(),
            venue_buy: "binance".to_string(),
            venue_sell: "lighter".to_string(),
            bucket_start_time: bucket,
            price_buy: dec!(100),
            price_sell: dec!(100.25),
            size_buy: dec!(1),
            size_sell: dec!(1),
            spread_pct: dec!(0.25),
            funding_rate_diff_8h: Some(dec!(0.0002)),
            funding_rate_diff_annual_pct: Some(dec!(0.219)),
        }
    }

    #[tokio::test]
    async fn writes_flush_to_sqlite_on_batch_timeout() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("history.db");
        let recorder = HistoryRecorder::spawn(HistoryRecorderConfig {
            db_path: db_path.clone(),
            queue_capacity: 10,
            batch_size: 100,
            batch_timeout: StdDuration::from_millis(20),
            csv_archive_enabled: false,
            csv_archive_dir: dir.path().join("archive"),
        })
        .unwrap();

        recorder.record(sample("BTC-USD-PERP", Utc::now()));
        tokio::time::sleep(StdDuration::from_millis(100)).await;
        recorder.shutdown().await;
        tokio::time::sleep(StdDuration::from_millis(50)).await;

        let conn = Connection::open(&db_path).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM spread_history_sampled", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn retention_cutoffs_are_ordered() {
        let policy = RetentionPolicy::new(10, 30);
        let now = Utc::now();
        let (compress_cutoff, archive_cutoff) = policy.cutoffs(now);
        assert!(archive_cutoff < compress_cutoff);
    }
}
