use thiserror::Error;

/// Errors surfaced by the ingestion/processing pipeline. These never unwind
/// past a component boundary; callers log and continue per component.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("queue full, dropped oldest entry for {venue}/{symbol}")]
    QueueOverflow { venue: String, symbol: String },

    #[error("adapter {venue} produced an unparseable payload: {reason}")]
    BadPayload { venue: String, reason: String },

    #[error("unknown venue {0}")]
    UnknownVenue(String),
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("connect failed for venue {venue}: {source}")]
    Connect {
        venue: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("adapter {venue} disconnected: {reason}")]
    Disconnected { venue: String, reason: String },
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("write-intent queue full, dropped newest record for {symbol}")]
    QueueOverflow { symbol: String },

    #[error("io error during archival: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
}
