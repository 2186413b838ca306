//! Synchronizer configuration
//!
//! Loaded from the worker's JSON config file; every tunable has a serde default
//! so a config only needs the instrument and the account.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynchronizerConfig {
    /// Exchange coin to subscribe to (`BTC`, `@107`, `xyz:COPPER`)
    pub coin: String,
    /// Human pair name fills may be tagged with (`PURR/USDC`)
    #[serde(default)]
    pub pair_name: Option<String>,
    /// Account address for fills and account events
    pub user: String,
    /// Minimum mid move, in basis points, that wakes the consumer
    #[serde(default = "default_update_threshold_bps")]
    pub update_threshold_bps: Decimal,
    /// Levels summed into bid/ask depth
    #[serde(default = "default_depth_levels")]
    pub depth_levels: usize,
    /// How long start() waits for the first orderbook message
    #[serde(default = "default_first_data_wait_ms")]
    pub first_data_wait_ms: u64,
    /// Maximum age of the last orderbook update before the feed counts as stale
    #[serde(default = "default_staleness_secs")]
    pub staleness_secs: u64,
    /// Pause between stop and start in reconnect()
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// Drop the historical fills batch sent right after subscribing
    #[serde(default)]
    pub skip_fill_snapshots: bool,
}

impl SynchronizerConfig {
    pub fn new(coin: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            coin: coin.into(),
            pair_name: None,
            user: user.into(),
            update_threshold_bps: default_update_threshold_bps(),
            depth_levels: default_depth_levels(),
            first_data_wait_ms: default_first_data_wait_ms(),
            staleness_secs: default_staleness_secs(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            skip_fill_snapshots: false,
        }
    }

    pub fn with_pair_name(mut self, pair_name: impl Into<String>) -> Self {
        self.pair_name = Some(pair_name.into());
        self
    }

    pub fn first_data_wait(&self) -> Duration {
        Duration::from_millis(self.first_data_wait_ms)
    }

    pub fn staleness(&self) -> Duration {
        Duration::from_secs(self.staleness_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.coin.is_empty() {
            return Err(ConfigError::Invalid("coin must not be empty".to_string()));
        }
        if self.user.is_empty() {
            return Err(ConfigError::Invalid("user must not be empty".to_string()));
        }
        if self.update_threshold_bps.is_sign_negative() {
            return Err(ConfigError::Invalid(format!(
                "update_threshold_bps must be >= 0, got {}",
                self.update_threshold_bps
            )));
        }
        if self.depth_levels == 0 {
            return Err(ConfigError::Invalid("depth_levels must be >= 1".to_string()));
        }
        Ok(())
    }
}

/// Load synchronizer configuration from a JSON file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<SynchronizerConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    load_config_from_str(&content)
}

/// Load configuration from a JSON string
pub fn load_config_from_str(json: &str) -> Result<SynchronizerConfig, ConfigError> {
    let config: SynchronizerConfig = serde_json::from_str(json)?;
    config.validate()?;
    Ok(config)
}

// Default value functions for serde
fn default_update_threshold_bps() -> Decimal {
    Decimal::from(5)
}

fn default_depth_levels() -> usize {
    5
}

fn default_first_data_wait_ms() -> u64 {
    5_000
}

fn default_staleness_secs() -> u64 {
    30
}

fn default_reconnect_delay_ms() -> u64 {
    2_000
}
