use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Strategy family a worker runs; selects which launcher starts it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    /// Spot market maker (config has a `pair`)
    Spot,
    /// Perpetual market maker (config has a `market`)
    Perp,
    /// Grid trader (config has a `grid` section)
    Grid,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 3] = [StrategyKind::Spot, StrategyKind::Perp, StrategyKind::Grid];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Spot => "spot",
            StrategyKind::Perp => "perp",
            StrategyKind::Grid => "grid",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown strategy type: {0}")]
pub struct UnknownStrategy(pub String);

impl FromStr for StrategyKind {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "spot" => Ok(StrategyKind::Spot),
            "perp" => Ok(StrategyKind::Perp),
            "grid" => Ok(StrategyKind::Grid),
            _ => Err(UnknownStrategy(s.to_string())),
        }
    }
}
