use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::fill::Fill;

/// Account-level event from the exchange's user events channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AccountEvent {
    /// Fills delivered through the events channel
    Fills(Vec<Fill>),
    /// Periodic funding payment on a perp position
    Funding {
        coin: String,
        usdc: Decimal,
        size: Decimal,
        funding_rate: Decimal,
    },
    /// The account was liquidated
    Liquidation {
        liquidation_id: u64,
        liquidated_notional: Decimal,
        account_value: Decimal,
    },
    /// Orders cancelled by the exchange rather than by us
    NonUserCancel { coins: Vec<String> },
    /// Event kind this crate does not model; raw JSON kept for logging
    Other(String),
}

impl AccountEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            AccountEvent::Fills(_) => "fills",
            AccountEvent::Funding { .. } => "funding",
            AccountEvent::Liquidation { .. } => "liquidation",
            AccountEvent::NonUserCancel { .. } => "nonUserCancel",
            AccountEvent::Other(_) => "other",
        }
    }
}
