use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Which reducer the History Recorder applies when collapsing a bucket's
/// samples into the single value that gets persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReducerStrategy {
    Max,
    Mean,
    Latest,
}

impl Default for ReducerStrategy {
    fn default() -> Self {
        ReducerStrategy::Max
    }
}

/// Full configuration surface (spec §6.3). Deserializable from TOML via
/// `Config::from_toml_str`; this crate never reads a config file itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub exchanges: Vec<String>,
    pub symbols: Vec<String>,

    pub orderbook_queue_capacity: usize,
    pub ticker_queue_capacity: usize,
    pub analysis_queue_capacity: usize,
    pub history_write_queue_capacity: usize,
    pub scroller_capacity: usize,

    pub min_spread_pct: f64,
    pub data_timeout_secs: u64,
    pub health_check_interval_secs: u64,

    pub display_continuation_tolerance_secs: u64,
    pub display_post_disappearance_hold_secs: u64,
    pub display_occurrence_window_secs: u64,
    pub display_occurrence_dedup_secs: u64,
    pub scroller_throttle_ms: u64,
    pub scroller_mid_price_change_threshold_pct: f64,
    pub scroller_new_opportunity_dedup_secs: u64,

    pub history_bucket_interval_secs: u64,
    pub history_reducer: ReducerStrategy,
    pub history_batch_size: usize,
    pub history_batch_timeout_ms: u64,
    pub history_db_path: String,
    pub history_csv_archive_enabled: bool,
    pub history_csv_archive_dir: String,
    pub history_compress_after_days: u64,
    pub history_archive_after_days: u64,
    pub history_cleanup_interval_secs: u64,

    pub analysis_loop_interval_ms: u64,
    pub ui_refresh_interval_ms: u64,
    pub shutdown_timeout_secs: u64,

    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            exchanges: Vec::new(),
            symbols: Vec::new(),

            orderbook_queue_capacity: 1000,
            ticker_queue_capacity: 500,
            analysis_queue_capacity: 100,
            history_write_queue_capacity: 500,
            scroller_capacity: 20,

            min_spread_pct: 0.1,
            data_timeout_secs: 30,
            health_check_interval_secs: 10,

            display_continuation_tolerance_secs: 2,
            display_post_disappearance_hold_secs: 5,
            display_occurrence_window_secs: 900,
            display_occurrence_dedup_secs: 1,
            scroller_throttle_ms: 500,
            scroller_mid_price_change_threshold_pct: 0.01,
            scroller_new_opportunity_dedup_secs: 1,

            history_bucket_interval_secs: 60,
            history_reducer: ReducerStrategy::Max,
            history_batch_size: 50,
            history_batch_timeout_ms: 5000,
            history_db_path: "spread_history.db".to_string(),
            history_csv_archive_enabled: false,
            history_csv_archive_dir: "archive".to_string(),
            history_compress_after_days: 10,
            history_archive_after_days: 30,
            history_cleanup_interval_secs: 24 * 3600,

            analysis_loop_interval_ms: 10,
            ui_refresh_interval_ms: 1000,
            shutdown_timeout_secs: 3,

            log_level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.exchanges.len() < 2 {
            return Err(ConfigError::Invalid(
                "at least two exchanges are required to detect a cross-venue spread".to_string(),
            ));
        }
        if self.symbols.is_empty() {
            return Err(ConfigError::Invalid("no symbols configured".to_string()));
        }
        for (name, value) in [
            ("orderbook_queue_capacity", self.orderbook_queue_capacity as i64),
            ("ticker_queue_capacity", self.ticker_queue_capacity as i64),
            ("analysis_queue_capacity", self.analysis_queue_capacity as i64),
            ("history_write_queue_capacity", self.history_write_queue_capacity as i64),
            ("scroller_capacity", self.scroller_capacity as i64),
            ("history_batch_size", self.history_batch_size as i64),
        ] {
            if value <= 0 {
                return Err(ConfigError::Invalid(format!("{name} must be positive")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid_once_exchanges_and_symbols_are_set() {
        let mut config = Config::default();
        config.exchanges = vec!["binance".to_string(), "lighter".to_string()];
        config.symbols = vec!["BTC-USD-PERP".to_string()];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_single_exchange() {
        let mut config = Config::default();
        config.exchanges = vec!["binance".to_string()];
        config.symbols = vec!["BTC-USD-PERP".to_string()];
        assert!(config.validate().is_err());
    }
}
