//! Helm Gateway
//!
//! Gateway layer between an exchange's push feed and a worker's market data
//! synchronizer. Provides:
//! - Transport ports (`PushTransport` / `PushSession`) with subscribe-by-topic
//!   and callback delivery on the transport's own thread
//! - Typed feed messages, decoded at the transport boundary
//! - Adapters: Hyperliquid websocket, and an in-process channel transport
//!
//! ## Architecture
//!
//! ```text
//! Exchange (Hyperliquid WS)          Tests / simulation
//!         │                                  │
//!   ┌─────▼──────────────┐        ┌──────────▼─────────┐
//!   │ HyperliquidSession │        │  ChannelSession    │
//!   │ (tokio runtime     │        │  (delivery thread) │
//!   │  thread, decoding) │        │                    │
//!   └─────┬──────────────┘        └──────────┬─────────┘
//!         │ FeedMessage                      │ FeedMessage
//!         └──────────────┬───────────────────┘
//!                  ┌─────▼──────┐
//!                  │  Router    │  topic → callbacks
//!                  └─────┬──────┘
//!                        ▼
//!              MarketDataSynchronizer
//! ```

pub mod adapters;
pub mod error;
pub mod messages;
pub mod transport;

// Re-export commonly used types
pub use adapters::hyperliquid::HyperliquidTransport;
pub use error::{DecodeError, TransportError};
pub use messages::{BookMessage, FeedMessage, FillBatch};
pub use transport::{
    DisconnectCallback, FeedCallback, PushSession, PushTransport, SubscriptionId, Topic,
    channel::{ChannelFeed, ChannelTransport},
    config::FeedConfig,
    router::SubscriptionRouter,
};
