use serde::{Deserialize, Serialize};

/// Side of a fill from our account's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Parse the exchange's side code: `B` (bid, we bought) or `A` (ask, we sold)
    pub fn from_exchange_code(code: &str) -> Option<Self> {
        match code {
            "B" | "b" | "buy" | "Buy" => Some(Side::Buy),
            "A" | "a" | "sell" | "Sell" => Some(Side::Sell),
            _ => None,
        }
    }

    /// Returns the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}
