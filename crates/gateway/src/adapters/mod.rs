//! Exchange adapters
//!
//! Adapters own the exchange connection and decode its wire format into
//! [`FeedMessage`](crate::messages::FeedMessage)s before routing them.

pub mod hyperliquid;

pub use hyperliquid::{HyperliquidSession, HyperliquidTransport};
