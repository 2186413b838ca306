//! Supervisor configuration
//!
//! Every timeout is an explicit policy value with a serde default, so an empty
//! `{}` file yields the standard behavior.

use helm_core::StrategyKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Placeholder replaced with the absolute config path in launcher templates
pub const CONFIG_PLACEHOLDER: &str = "{config}";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Command template that starts one strategy family
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LauncherConfig {
    pub program: String,
    /// Arguments; `{config}` is replaced with the worker's config path
    #[serde(default)]
    pub args: Vec<String>,
}

impl LauncherConfig {
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisorConfig {
    /// Directory holding one JSON config per worker
    #[serde(default = "default_config_dir")]
    pub config_dir: PathBuf,
    /// Working directory for spawned workers (inherited when unset)
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// Extra environment for every worker, on top of the inherited one
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Launcher per strategy name (`spot`, `perp`, `grid`)
    #[serde(default)]
    pub launchers: BTreeMap<String, LauncherConfig>,

    /// How long start() waits before declaring the worker alive
    #[serde(default = "default_crash_probe_ms")]
    pub crash_probe_ms: u64,
    /// Wait after SIGTERM before escalating
    #[serde(default = "default_graceful_stop_ms")]
    pub graceful_stop_ms: u64,
    /// Wait after SIGKILL before the last-resort kill(2)
    #[serde(default = "default_forceful_stop_ms")]
    pub forceful_stop_ms: u64,
    /// Pause after the last-resort kill(2) before re-checking
    #[serde(default = "default_last_resort_grace_ms")]
    pub last_resort_grace_ms: u64,
    #[serde(default = "default_reap_interval_ms")]
    pub reap_interval_ms: u64,
    /// How long a dead, un-stopped entry stays visible
    #[serde(default = "default_dead_retention_secs")]
    pub dead_retention_secs: u64,
    /// Log lines kept per worker
    #[serde(default = "default_log_capacity")]
    pub log_capacity: usize,
    /// Characters of output kept in a spawn failure
    #[serde(default = "default_spawn_output_limit")]
    pub spawn_output_limit: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        SupervisorConfig {
            config_dir: default_config_dir(),
            working_dir: None,
            env: BTreeMap::new(),
            launchers: BTreeMap::new(),
            crash_probe_ms: default_crash_probe_ms(),
            graceful_stop_ms: default_graceful_stop_ms(),
            forceful_stop_ms: default_forceful_stop_ms(),
            last_resort_grace_ms: default_last_resort_grace_ms(),
            reap_interval_ms: default_reap_interval_ms(),
            dead_retention_secs: default_dead_retention_secs(),
            log_capacity: default_log_capacity(),
            spawn_output_limit: default_spawn_output_limit(),
        }
    }
}

impl SupervisorConfig {
    pub fn launcher(&self, strategy: StrategyKind) -> Option<&LauncherConfig> {
        self.launchers.get(strategy.as_str())
    }

    pub fn with_launcher(mut self, strategy: StrategyKind, launcher: LauncherConfig) -> Self {
        self.launchers.insert(strategy.as_str().to_string(), launcher);
        self
    }

    pub fn crash_probe(&self) -> Duration {
        Duration::from_millis(self.crash_probe_ms)
    }

    pub fn graceful_stop(&self) -> Duration {
        Duration::from_millis(self.graceful_stop_ms)
    }

    pub fn forceful_stop(&self) -> Duration {
        Duration::from_millis(self.forceful_stop_ms)
    }

    pub fn last_resort_grace(&self) -> Duration {
        Duration::from_millis(self.last_resort_grace_ms)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_millis(self.reap_interval_ms)
    }

    pub fn dead_retention(&self) -> Duration {
        Duration::from_secs(self.dead_retention_secs)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        for name in self.launchers.keys() {
            if name.parse::<StrategyKind>().is_err() {
                return Err(ConfigError::Invalid(format!(
                    "launcher for unknown strategy '{}'",
                    name
                )));
            }
        }
        if self.log_capacity == 0 {
            return Err(ConfigError::Invalid("log_capacity must be >= 1".to_string()));
        }
        if self.reap_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "reap_interval_ms must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load supervisor configuration from a JSON file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<SupervisorConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    load_config_from_str(&content)
}

/// Load configuration from a JSON string
pub fn load_config_from_str(json: &str) -> Result<SupervisorConfig, ConfigError> {
    let config: SupervisorConfig = serde_json::from_str(json)?;
    config.validate()?;
    Ok(config)
}

// Default value functions for serde
fn default_config_dir() -> PathBuf {
    PathBuf::from("config")
}

fn default_crash_probe_ms() -> u64 {
    500
}

fn default_graceful_stop_ms() -> u64 {
    3_000
}

fn default_forceful_stop_ms() -> u64 {
    5_000
}

fn default_last_resort_grace_ms() -> u64 {
    500
}

fn default_reap_interval_ms() -> u64 {
    5_000
}

fn default_dead_retention_secs() -> u64 {
    60
}

fn default_log_capacity() -> usize {
    200
}

fn default_spawn_output_limit() -> usize {
    500
}
