use helm_core::ConfigKey;
use thiserror::Error;

use crate::resolver::ResolveError;

#[derive(Error, Debug)]
pub enum SupervisorError {
    /// Worker could not be launched or died inside the crash-probe window
    #[error("[{key}] Failed to start: {output}")]
    SpawnFailure { key: ConfigKey, output: String },
    #[error("[{key}] Already running (PID: {pid})")]
    AlreadyRunning { key: ConfigKey, pid: u32 },
    #[error("No worker tracked for {0}")]
    NotFound(ConfigKey),
    #[error("[{key}] {source}")]
    ConfigResolution {
        key: ConfigKey,
        #[source]
        source: ResolveError,
    },
}

impl SupervisorError {
    pub fn key(&self) -> &ConfigKey {
        match self {
            SupervisorError::SpawnFailure { key, .. }
            | SupervisorError::AlreadyRunning { key, .. }
            | SupervisorError::ConfigResolution { key, .. } => key,
            SupervisorError::NotFound(key) => key,
        }
    }
}
