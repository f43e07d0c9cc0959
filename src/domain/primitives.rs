//! Domain primitives: TimeMs, ObjectId, AssetSymbol.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Time in milliseconds since Unix epoch.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TimeMs(pub i64);

impl TimeMs {
    /// Create a TimeMs from milliseconds.
    pub fn new(ms: i64) -> Self {
        TimeMs(ms)
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        TimeMs(chrono::Utc::now().timestamp_millis())
    }

    /// Get the underlying milliseconds value.
    pub fn as_ms(&self) -> i64 {
        self.0
    }

    /// This instant shifted forward by `ms`, saturating.
    pub fn plus_ms(&self, ms: u64) -> Self {
        TimeMs(self.0.saturating_add(i64::try_from(ms).unwrap_or(i64::MAX)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ObjectIdParseError {
    #[error("object id is empty")]
    Empty,
    #[error("object id longer than 32 bytes: {0}")]
    TooLong(String),
    #[error("object id is not hex: {0}")]
    NotHex(String),
}

/// On-chain object identifier, normalized to `0x` + 64 lowercase hex chars.
///
/// Pools, position capabilities and view packages all share this address space.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectId(String);

/// Pool object.
pub type PoolId = ObjectId;

/// Capability object that identifies one depositor slot within a pool.
pub type PositionKey = ObjectId;

impl ObjectId {
    const HEX_LEN: usize = 64;

    /// The all-zero address, used as the sender of simulated calls.
    pub fn zero() -> Self {
        ObjectId(format!("0x{}", "0".repeat(Self::HEX_LEN)))
    }

    /// Parse and normalize an object id. Short forms like `0x2` are left-padded.
    pub fn parse(s: &str) -> Result<Self, ObjectIdParseError> {
        let trimmed = s.trim();
        let body = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        if body.is_empty() {
            return Err(ObjectIdParseError::Empty);
        }
        if body.len() > Self::HEX_LEN {
            return Err(ObjectIdParseError::TooLong(s.to_string()));
        }

        let padded = format!("{:0>width$}", body.to_ascii_lowercase(), width = Self::HEX_LEN);
        hex::decode(&padded).map_err(|_| ObjectIdParseError::NotHex(s.to_string()))?;
        Ok(ObjectId(format!("0x{}", padded)))
    }

    /// Get the id as a string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Raw 32-byte form.
    pub fn to_bytes(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        // Normalized on construction, so decoding cannot fail.
        if let Ok(bytes) = hex::decode(&self.0[2..]) {
            out.copy_from_slice(&bytes);
        }
        out
    }

    /// Abbreviated form for log lines.
    pub fn short(&self) -> String {
        let body = self.0[2..].trim_start_matches('0');
        let body = if body.is_empty() { "0" } else { body };
        if body.len() <= 8 {
            format!("0x{}", body)
        } else {
            format!("0x{}..{}", &body[..4], &body[body.len() - 4..])
        }
    }
}

impl FromStr for ObjectId {
    type Err = ObjectIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ObjectId {
    type Error = ObjectIdParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ObjectId> for String {
    fn from(value: ObjectId) -> Self {
        value.0
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Base asset symbol (e.g., "SUI", "USDC").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssetSymbol(pub String);

impl AssetSymbol {
    /// Create an AssetSymbol from a string.
    pub fn new(symbol: String) -> Self {
        AssetSymbol(symbol)
    }

    /// Get the symbol as a string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Smallest-unit decimals of the asset. Unknown assets use the chain's native 9.
    pub fn decimals(&self) -> u32 {
        match self.0.to_ascii_uppercase().as_str() {
            "USDC" | "USDT" | "WUSDC" | "WUSDT" => 6,
            "WETH" | "WBTC" | "ETH" | "BTC" => 8,
            _ => 9,
        }
    }
}

impl std::fmt::Display for AssetSymbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_id_pads_short_form() {
        let id = ObjectId::parse("0x2").unwrap();
        assert_eq!(id.as_str().len(), 66);
        assert!(id.as_str().ends_with("02"));
        assert_eq!(id.short(), "0x2");
    }

    #[test]
    fn test_object_id_normalizes_case_and_prefix() {
        let a = ObjectId::parse("0xABCDEF").unwrap();
        let b = ObjectId::parse("abcdef").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_object_id_rejects_garbage() {
        assert_eq!(ObjectId::parse("0x"), Err(ObjectIdParseError::Empty));
        assert!(matches!(
            ObjectId::parse("0xzz"),
            Err(ObjectIdParseError::NotHex(_))
        ));
        let long = format!("0x{}", "1".repeat(65));
        assert!(matches!(
            ObjectId::parse(&long),
            Err(ObjectIdParseError::TooLong(_))
        ));
    }

    #[test]
    fn test_object_id_serde_validates() {
        let id: ObjectId = serde_json::from_str("\"0x5\"").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), format!("\"{}\"", id));
        assert!(serde_json::from_str::<ObjectId>("\"nope\"").is_err());
    }

    #[test]
    fn test_zero_address_bytes() {
        assert_eq!(ObjectId::zero().to_bytes(), [0u8; 32]);
    }

    #[test]
    fn test_asset_decimals() {
        assert_eq!(AssetSymbol::new("usdc".to_string()).decimals(), 6);
        assert_eq!(AssetSymbol::new("SUI".to_string()).decimals(), 9);
        assert_eq!(AssetSymbol::new("WBTC".to_string()).decimals(), 8);
    }

    #[test]
    fn test_timems_ordering() {
        let t1 = TimeMs::new(1000);
        let t2 = t1.plus_ms(500);
        assert!(t1 < t2);
        assert_eq!(t2.as_ms(), 1500);
    }
}
