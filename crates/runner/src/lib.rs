//! Helm Runner
//!
//! Worker-side main loop plus the `helm` control binary.
//!
//! - **Decision Loop**: waits on the market-data synchronizer and runs the
//!   strategy handler on significant updates, fills, or a fallback timer
//! - **helm binary**: starts strategy workers under a `ProcessSupervisor`,
//!   streams their logs, and stops them all on Ctrl-C
//!
//! ## Architecture
//!
//! ```text
//!   helm (control process)                 strategy worker
//!   ──────────────────────                 ───────────────
//!   ProcessSupervisor ──spawn──►  MarketDataSynchronizer ◄── exchange feed
//!        │    ▲                            │ wake
//!        │    └──── log lines ────┐        ▼
//!        ▼                        │   DecisionLoop ──► DecisionHandler
//!   ChannelObserver ──► log       └───────── stdout/stderr
//! ```

pub mod decision_loop;

pub use decision_loop::{
    Control, DecisionHandler, DecisionLoop, HandlerResult, LoopConfig, LoopSummary, StopHandle,
    Tick, Trigger,
};
