use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::values::{Price, Quantity, Timestamp};

const BPS: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);

/// Order book level (price + size)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: Price,
    pub size: Quantity,
}

impl BookLevel {
    pub fn new(price: Price, size: Quantity) -> Self {
        Self { price, size }
    }
}

/// Top-of-book summary cached by a worker's market data synchronizer
///
/// `mid` is always `(best_bid + best_ask) / 2`, recomputed from the levels of the
/// message that produced the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderbookSnapshot {
    pub coin: String,
    pub best_bid: Price,
    pub best_ask: Price,
    pub mid: Price,
    pub spread: Price,
    pub spread_bps: Decimal,
    /// Sum of sizes over the top `depth_levels` bid levels
    pub bid_depth: Quantity,
    /// Sum of sizes over the top `depth_levels` ask levels
    pub ask_depth: Quantity,
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
    /// Exchange-side time of the message (ms since epoch)
    pub exchange_time_ms: u64,
    /// Local time the snapshot was cached
    pub timestamp: Timestamp,
}

impl OrderbookSnapshot {
    /// Build a snapshot from best-first bid and ask levels
    ///
    /// Returns None if either side is empty.
    pub fn from_levels(
        coin: impl Into<String>,
        bids: Vec<BookLevel>,
        asks: Vec<BookLevel>,
        depth_levels: usize,
        exchange_time_ms: u64,
        timestamp: Timestamp,
    ) -> Option<Self> {
        let best_bid = bids.first()?.price;
        let best_ask = asks.first()?.price;

        let mid = (best_bid + best_ask) / Decimal::TWO;
        let spread = best_ask - best_bid;
        let spread_bps = if mid.is_zero() {
            Decimal::ZERO
        } else {
            spread / mid * BPS
        };

        let bid_depth = bids.iter().take(depth_levels).map(|l| l.size).sum();
        let ask_depth = asks.iter().take(depth_levels).map(|l| l.size).sum();

        Some(Self {
            coin: coin.into(),
            best_bid,
            best_ask,
            mid,
            spread,
            spread_bps,
            bid_depth,
            ask_depth,
            bids,
            asks,
            exchange_time_ms,
            timestamp,
        })
    }

    /// Absolute relative change of this snapshot's mid versus `previous_mid`, in basis points
    ///
    /// Returns None when the previous mid is zero (no meaningful reference).
    pub fn mid_change_bps(&self, previous_mid: Price) -> Option<Decimal> {
        if previous_mid.is_zero() {
            return None;
        }
        Some(((self.mid - previous_mid) / previous_mid).abs() * BPS)
    }
}
