//! Feed connection configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Hyperliquid mainnet websocket endpoint
pub const MAINNET_WS_URL: &str = "wss://api.hyperliquid.xyz/ws";

/// Hyperliquid testnet websocket endpoint
pub const TESTNET_WS_URL: &str = "wss://api.hyperliquid-testnet.xyz/ws";

/// Connection settings for a websocket push feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// WebSocket URL
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    /// Application-level ping interval in milliseconds (server drops idle sockets after 60s)
    #[serde(default = "default_ping_interval")]
    pub ping_interval_ms: u64,
    /// Maximum time to establish the connection, in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        FeedConfig {
            ws_url: default_ws_url(),
            ping_interval_ms: default_ping_interval(),
            connect_timeout_ms: default_connect_timeout(),
        }
    }
}

impl FeedConfig {
    pub fn testnet() -> Self {
        FeedConfig {
            ws_url: TESTNET_WS_URL.to_string(),
            ..Default::default()
        }
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

// Default value functions for serde
fn default_ws_url() -> String {
    MAINNET_WS_URL.to_string()
}

fn default_ping_interval() -> u64 {
    50_000
}

fn default_connect_timeout() -> u64 {
    10_000
}
