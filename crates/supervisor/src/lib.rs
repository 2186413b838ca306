//! Helm Supervisor
//!
//! Runs each strategy as an independent OS process and keeps it accountable:
//! - `start` resolves a config key, spawns the worker and probes it for an
//!   immediate crash
//! - a drain thread per worker captures combined stdout/stderr into a bounded,
//!   timestamped log ring
//! - `stop` escalates SIGTERM → SIGKILL → kill(2) and always forgets the entry
//! - a reaper marks workers that died on their own and purges them after a
//!   retention window
//!
//! ## Architecture
//!
//! ```text
//!   caller ──► ProcessSupervisor ──► ConfigResolver ──► LaunchSpec
//!                    │                                     │
//!                    │ registry (one mutex)   ProcessLauncher ◄┘
//!          ┌─────────┼──────────────┐
//!          ▼         ▼              ▼
//!   ManagedProcess  ManagedProcess  ...        reaper thread (tick)
//!     │  child handle                              │
//!     └─ drain thread ──► RingBuffer              sweeps registry
//!              │
//!              └──► SupervisorObserver (log lines, status changes)
//! ```

pub mod config;
pub mod error;
pub mod launcher;
pub mod observer;
pub mod process;
pub mod resolver;
pub mod supervisor;

pub use config::{ConfigError, LauncherConfig, SupervisorConfig, load_config, load_config_from_str};
pub use error::SupervisorError;
pub use launcher::{ProcessLauncher, SystemLauncher, WorkerHandle};
pub use observer::{ChannelObserver, SupervisorEvent, SupervisorObserver};
pub use process::{ManagedProcess, ProcessStatus, StopOutcome, StopPolicy, format_uptime};
pub use resolver::{
    ConfigResolver, DirectoryResolver, DiscoveredConfig, LaunchSpec, ResolveError, StaticResolver,
};
pub use supervisor::{
    ProcessSupervisor, ReapReport, StopAllReport, Started, Stopped, SupervisorBuilder,
};
