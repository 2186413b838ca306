use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a supervised worker
///
/// ```text
/// Starting ──► Running ──► Stopping ──► Stopped
///                 │
///                 └──────► Crashed   (exit without stop())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
    /// Spawned, still inside the crash-probe window
    Starting,
    /// Survived the crash probe
    Running,
    /// Kill sequence in progress
    Stopping,
    /// Terminated through stop()
    Stopped,
    /// Exited on its own while running
    Crashed,
}

impl ProcessState {
    /// Check whether moving to `next` is a legal transition
    pub fn can_transition_to(&self, next: ProcessState) -> bool {
        use ProcessState::*;
        matches!(
            (self, next),
            (Starting, Running)
                | (Starting, Crashed)
                | (Running, Stopping)
                | (Running, Crashed)
                | (Stopping, Stopped)
                | (Crashed, Stopping)
        )
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProcessState::Starting => "starting",
            ProcessState::Running => "running",
            ProcessState::Stopping => "stopping",
            ProcessState::Stopped => "stopped",
            ProcessState::Crashed => "crashed",
        };
        f.write_str(s)
    }
}

/// How a stop() call actually ended the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopMethod {
    /// Process had already exited; nothing was signaled
    AlreadyExited,
    /// SIGTERM was enough
    Graceful,
    /// SIGKILL through the process handle
    Forced,
    /// Direct kill(2) after the handle failed to confirm death
    LastResort,
}

impl fmt::Display for StopMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StopMethod::AlreadyExited => "already exited",
            StopMethod::Graceful => "SIGTERM (graceful)",
            StopMethod::Forced => "SIGKILL (forced)",
            StopMethod::LastResort => "kill(2) (last resort)",
        };
        f.write_str(s)
    }
}
