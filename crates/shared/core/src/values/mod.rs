use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Price value - uses Decimal for precision
pub type Price = Decimal;

/// Quantity value - uses Decimal for precision
pub type Quantity = Decimal;

/// Timestamp in UTC
pub type Timestamp = DateTime<Utc>;

/// Identifies one strategy worker (the name of its configuration file, e.g. `grid_btc.json`)
///
/// Unique per worker: the supervisor never tracks two processes under the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigKey(String);

impl ConfigKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConfigKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ConfigKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Borrow<str> for ConfigKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Strip a venue/dex namespace from an exchange identifier: `xyz:COPPER` -> `COPPER`
///
/// Identifiers without a namespace are returned unchanged.
pub fn strip_namespace(identifier: &str) -> &str {
    match identifier.rsplit_once(':') {
        Some((_, bare)) => bare,
        None => identifier,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_strip_namespace() {
        assert_eq!(strip_namespace("xyz:COPPER"), "COPPER");
        assert_eq!(strip_namespace("COPPER"), "COPPER");
        assert_eq!(strip_namespace("@254"), "@254");
        assert_eq!(strip_namespace("a:b:PURR"), "PURR");
    }

    #[test]
    fn test_config_key_lookup_by_str() {
        let mut map = HashMap::new();
        map.insert(ConfigKey::from("grid_btc.json"), 1);
        assert_eq!(map.get("grid_btc.json"), Some(&1));
        assert_eq!(ConfigKey::new("a").to_string(), "a");
    }
}
