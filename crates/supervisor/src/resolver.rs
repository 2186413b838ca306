//! Config key resolution
//!
//! A resolver turns a config key into the command that runs the worker and the
//! strategy family it belongs to. The supervisor only ever sees [`LaunchSpec`]s.

use helm_core::{ConfigKey, StrategyKind};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::{CONFIG_PLACEHOLDER, LauncherConfig, SupervisorConfig};

/// File in the config directory that holds shared settings, not a worker
pub const SHARED_CONFIG_FILE: &str = "config.json";

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Invalid config key '{0}': must be a plain file name")]
    InvalidKey(String),
    #[error("Config file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),
    #[error("Failed to read {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse {}: {source}", path.display())]
    InvalidJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Could not detect strategy type from {}", .0.display())]
    UndetectableStrategy(PathBuf),
    #[error("No launcher configured for {0} workers")]
    NoLauncher(StrategyKind),
    #[error("Unknown config key: {0}")]
    UnknownKey(ConfigKey),
}

/// Everything needed to spawn one worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Set on top of the inherited environment
    pub env: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
    pub strategy: StrategyKind,
}

impl LaunchSpec {
    pub fn new(program: impl Into<String>, strategy: StrategyKind) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            cwd: None,
            strategy,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Program and arguments joined for logging
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Maps a config key to a launch spec
pub trait ConfigResolver: Send + Sync {
    fn resolve(&self, key: &ConfigKey) -> Result<LaunchSpec, ResolveError>;
}

/// A config found by [`DirectoryResolver::discover`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredConfig {
    pub key: ConfigKey,
    /// None when the file does not look like any known strategy
    pub strategy: Option<StrategyKind>,
}

/// Resolves keys as JSON file names inside a config directory
///
/// The strategy is detected from the file's top-level keys: `pair` means spot,
/// `grid` means grid, `market` means perp, checked in that order.
pub struct DirectoryResolver {
    config_dir: PathBuf,
    launchers: BTreeMap<String, LauncherConfig>,
    env: Vec<(String, String)>,
    cwd: Option<PathBuf>,
}

impl DirectoryResolver {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
            launchers: BTreeMap::new(),
            env: Vec::new(),
            cwd: None,
        }
    }

    pub fn from_config(config: &SupervisorConfig) -> Self {
        Self {
            config_dir: config.config_dir.clone(),
            launchers: config.launchers.clone(),
            env: config
                .env
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            cwd: config.working_dir.clone(),
        }
    }

    pub fn with_launcher(mut self, strategy: StrategyKind, launcher: LauncherConfig) -> Self {
        self.launchers.insert(strategy.as_str().to_string(), launcher);
        self
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Detect the strategy family of a config file
    pub fn detect_strategy(path: &Path) -> Result<StrategyKind, ResolveError> {
        let content = std::fs::read_to_string(path).map_err(|source| ResolveError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;
        let value: Value =
            serde_json::from_str(&content).map_err(|source| ResolveError::InvalidJson {
                path: path.to_path_buf(),
                source,
            })?;

        let Some(object) = value.as_object() else {
            return Err(ResolveError::UndetectableStrategy(path.to_path_buf()));
        };
        if object.contains_key("pair") {
            Ok(StrategyKind::Spot)
        } else if object.contains_key("grid") {
            Ok(StrategyKind::Grid)
        } else if object.contains_key("market") {
            Ok(StrategyKind::Perp)
        } else {
            Err(ResolveError::UndetectableStrategy(path.to_path_buf()))
        }
    }

    /// List worker configs in the directory, sorted by key
    ///
    /// Skips non-JSON files and the shared `config.json`.
    pub fn discover(&self) -> Result<Vec<DiscoveredConfig>, ResolveError> {
        let entries =
            std::fs::read_dir(&self.config_dir).map_err(|source| ResolveError::Unreadable {
                path: self.config_dir.clone(),
                source,
            })?;

        let mut found = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name == SHARED_CONFIG_FILE {
                continue;
            }
            found.push(DiscoveredConfig {
                key: ConfigKey::new(name),
                strategy: Self::detect_strategy(&path).ok(),
            });
        }
        found.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(found)
    }

    fn config_path(&self, key: &ConfigKey) -> Result<PathBuf, ResolveError> {
        let name = key.as_str();
        let plain = Path::new(name)
            .file_name()
            .is_some_and(|file_name| file_name == name);
        if !plain || name == ".." {
            return Err(ResolveError::InvalidKey(name.to_string()));
        }
        Ok(self.config_dir.join(name))
    }
}

impl ConfigResolver for DirectoryResolver {
    fn resolve(&self, key: &ConfigKey) -> Result<LaunchSpec, ResolveError> {
        let path = self.config_path(key)?;
        if !path.is_file() {
            return Err(ResolveError::ConfigNotFound(path));
        }

        let strategy = Self::detect_strategy(&path)?;
        let launcher = self
            .launchers
            .get(strategy.as_str())
            .ok_or(ResolveError::NoLauncher(strategy))?;

        // Workers may run from another directory; hand them an absolute path
        let path = std::path::absolute(&path).unwrap_or(path);
        let path = path.to_string_lossy();

        let mut spec = LaunchSpec::new(
            launcher.program.replace(CONFIG_PLACEHOLDER, &path),
            strategy,
        )
        .args(
            launcher
                .args
                .iter()
                .map(|arg| arg.replace(CONFIG_PLACEHOLDER, &path)),
        );
        spec.env = self.env.clone();
        spec.cwd = self.cwd.clone();
        Ok(spec)
    }
}

/// Fixed key → spec table, for embedding and tests
#[derive(Default)]
pub struct StaticResolver {
    specs: HashMap<ConfigKey, LaunchSpec>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<ConfigKey>, spec: LaunchSpec) -> Self {
        self.specs.insert(key.into(), spec);
        self
    }

    pub fn insert(&mut self, key: impl Into<ConfigKey>, spec: LaunchSpec) {
        self.specs.insert(key.into(), spec);
    }
}

impl ConfigResolver for StaticResolver {
    fn resolve(&self, key: &ConfigKey) -> Result<LaunchSpec, ResolveError> {
        self.specs
            .get(key)
            .cloned()
            .ok_or_else(|| ResolveError::UnknownKey(key.clone()))
    }
}

impl fmt::Debug for DirectoryResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryResolver")
            .field("config_dir", &self.config_dir)
            .field("launchers", &self.launchers.keys().collect::<Vec<_>>())
            .finish()
    }
}
