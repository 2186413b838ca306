//! Helm Market Data
//!
//! Per-worker bridge between an exchange push feed and a synchronous decision
//! loop. The transport delivers messages on its own thread; the synchronizer
//! caches them under short-lived locks and wakes the consumer only when
//! something worth acting on happened.
//!
//! ## Architecture
//!
//! ```text
//!  transport thread                          decision thread
//!  ────────────────                          ───────────────
//!  FeedMessage ──► handle()                  wait_for_update(timeout)
//!                   │                               ▲
//!                   ├─► orderbook cache ─┐          │
//!                   ├─► fills queue ─────┼─ locks released
//!                   └─► link state ──────┘          │
//!                          │                        │
//!                          └──► UpdateSignal ───────┘  (significant only)
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! let sync = MarketDataSynchronizer::new(config, transport);
//! sync.start()?;
//! loop {
//!     sync.wait_for_update(Some(Duration::from_secs(5)));
//!     let updates = sync.check_updates();
//!     if updates.orderbook { /* requote from sync.orderbook() */ }
//!     if updates.fills { /* book fills from sync.take_fills() */ }
//! }
//! ```

pub mod config;
pub mod error;
pub mod synchronizer;

pub use config::{ConfigError, SynchronizerConfig, load_config, load_config_from_str};
pub use error::SyncError;
pub use helm_sync::{UpdateKind, Updates};
pub use synchronizer::{MarketDataSynchronizer, SyncStats, UpdateListener};
