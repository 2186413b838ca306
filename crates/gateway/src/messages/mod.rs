//! Feed message types
//!
//! Every payload the exchange pushes is decoded into one of these variants at the
//! transport boundary; nothing past the transport sees raw JSON.

pub mod hyperliquid;

use helm_core::{AccountEvent, BookLevel, Fill, strip_namespace};
use serde::{Deserialize, Serialize};

/// Level-2 book message for one instrument, levels best-first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookMessage {
    pub coin: String,
    /// Exchange time (ms since epoch)
    pub time_ms: u64,
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

/// Batch of fills for one account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillBatch {
    pub user: String,
    /// True for the historical batch sent right after subscribing
    pub is_snapshot: bool,
    pub fills: Vec<Fill>,
}

/// Decoded push message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FeedMessage {
    OrderBook(BookMessage),
    Fills(FillBatch),
    AccountEvent(AccountEvent),
}

impl FeedMessage {
    /// Short name of the message kind, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            FeedMessage::OrderBook(_) => "orderbook",
            FeedMessage::Fills(_) => "fills",
            FeedMessage::AccountEvent(_) => "account_event",
        }
    }

    /// Check whether this book message is for `coin`, tolerating a missing dex namespace on either side
    pub fn is_book_for(&self, coin: &str) -> bool {
        match self {
            FeedMessage::OrderBook(book) => {
                book.coin == coin
                    || book.coin == strip_namespace(coin)
                    || strip_namespace(&book.coin) == coin
            }
            _ => false,
        }
    }
}
