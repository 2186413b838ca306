use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::side::Side;
use crate::values::{Price, Quantity, strip_namespace};

/// One execution of our order, as reported by the exchange's fills channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    /// Exchange identifier of the instrument; may or may not carry a dex prefix
    pub coin: String,
    pub side: Side,
    pub price: Price,
    pub size: Quantity,
    /// Exchange time (ms since epoch)
    pub time_ms: u64,
    pub order_id: u64,
    pub trade_id: u64,
    pub fee: Decimal,
    pub fee_token: String,
    pub closed_pnl: Decimal,
    /// True when the order crossed the spread (taker)
    pub crossed: bool,
}

impl Fill {
    /// Check whether this fill belongs to the instrument a worker subscribed to
    ///
    /// Matches the raw subscribed coin, its un-namespaced form, and the same two
    /// forms of the optional pair name (`PURR/USDC`).
    pub fn matches_instrument(&self, coin: &str, pair_name: Option<&str>) -> bool {
        let fill_coin = self.coin.as_str();
        if fill_coin == coin || fill_coin == strip_namespace(coin) {
            return true;
        }
        match pair_name {
            Some(pair) => fill_coin == pair || fill_coin == strip_namespace(pair),
            None => false,
        }
    }

    /// Signed notional: positive for buys
    pub fn signed_notional(&self) -> Decimal {
        let notional = self.price * self.size;
        match self.side {
            Side::Buy => notional,
            Side::Sell => -notional,
        }
    }
}
