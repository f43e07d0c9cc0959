//! Indexed supply/withdraw events and their typed decoder.
//!
//! The indexer has shipped two field layouts per event kind. Each layout is a
//! concrete serde struct; anything matching none of them is rejected as a whole
//! rather than partially read.

use crate::domain::TimeMs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Supply,
    Withdraw,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::Supply => write!(f, "supply"),
            EventKind::Withdraw => write!(f, "withdraw"),
        }
    }
}

/// One share-changing event for a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEvent {
    pub kind: EventKind,
    /// Shares minted (supply) or burned (withdraw). Always unsigned.
    pub shares_delta: u64,
    /// Base units paid in (supply) or paid out (withdraw).
    pub base_units_delta: u64,
    pub timestamp: TimeMs,
}

impl LedgerEvent {
    pub fn supply(shares: u64, base_units: u64, timestamp: TimeMs) -> Self {
        Self {
            kind: EventKind::Supply,
            shares_delta: shares,
            base_units_delta: base_units,
            timestamp,
        }
    }

    pub fn withdraw(shares: u64, base_units: u64, timestamp: TimeMs) -> Self {
        Self {
            kind: EventKind::Withdraw,
            shares_delta: shares,
            base_units_delta: base_units,
            timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventDecodeError {
    #[error("unrecognized {kind} event shape at index {index} (fields: {fields})")]
    UnrecognizedShape {
        kind: EventKind,
        index: usize,
        fields: String,
    },
    #[error("invalid {field} in {kind} event at index {index}: {reason}")]
    InvalidField {
        kind: EventKind,
        index: usize,
        field: &'static str,
        reason: String,
    },
}

/// Unsigned amount that indexers emit either as a JSON number or a decimal string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AmountField {
    Number(u64),
    Text(String),
}

impl AmountField {
    fn value(&self) -> Result<u64, String> {
        match self {
            AmountField::Number(n) => Ok(*n),
            AmountField::Text(s) => s.trim().parse::<u64>().map_err(|e| format!("{}: {:?}", e, s)),
        }
    }
}

/// Epoch milliseconds, either numeric or as an RFC 3339 string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TimestampField {
    Millis(i64),
    Text(String),
}

impl TimestampField {
    fn value(&self) -> Result<TimeMs, String> {
        match self {
            TimestampField::Millis(ms) => Ok(TimeMs::new(*ms)),
            TimestampField::Text(s) => {
                if let Ok(ms) = s.trim().parse::<i64>() {
                    return Ok(TimeMs::new(ms));
                }
                chrono::DateTime::parse_from_rfc3339(s.trim())
                    .map(|dt| TimeMs::new(dt.timestamp_millis()))
                    .map_err(|e| format!("{}: {:?}", e, s))
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct LegacyEvent {
    shares: AmountField,
    amount: AmountField,
    timestamp: TimestampField,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SupplyEventV2 {
    shares_minted: AmountField,
    assets_deposited: AmountField,
    timestamp_ms: TimestampField,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WithdrawEventV2 {
    shares_burned: AmountField,
    assets_withdrawn: AmountField,
    timestamp_ms: TimestampField,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SupplySchema {
    V2(SupplyEventV2),
    Legacy(LegacyEvent),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WithdrawSchema {
    V2(WithdrawEventV2),
    Legacy(LegacyEvent),
}

/// Decode one raw event of a known kind.
pub fn decode_event(
    kind: EventKind,
    index: usize,
    raw: &serde_json::Value,
) -> Result<LedgerEvent, EventDecodeError> {
    let unrecognized = || EventDecodeError::UnrecognizedShape {
        kind,
        index,
        fields: field_names(raw),
    };

    let (shares, amount, timestamp) = match kind {
        EventKind::Supply => match SupplySchema::deserialize(raw).map_err(|_| unrecognized())? {
            SupplySchema::V2(e) => (e.shares_minted, e.assets_deposited, e.timestamp_ms),
            SupplySchema::Legacy(e) => (e.shares, e.amount, e.timestamp),
        },
        EventKind::Withdraw => match WithdrawSchema::deserialize(raw).map_err(|_| unrecognized())? {
            WithdrawSchema::V2(e) => (e.shares_burned, e.assets_withdrawn, e.timestamp_ms),
            WithdrawSchema::Legacy(e) => (e.shares, e.amount, e.timestamp),
        },
    };

    let invalid = |field: &'static str, reason: String| EventDecodeError::InvalidField {
        kind,
        index,
        field,
        reason,
    };

    Ok(LedgerEvent {
        kind,
        shares_delta: shares.value().map_err(|r| invalid("shares", r))?,
        base_units_delta: amount.value().map_err(|r| invalid("amount", r))?,
        timestamp: timestamp.value().map_err(|r| invalid("timestamp", r))?,
    })
}

/// Decode a page of raw events. One unrecognized record rejects the page.
pub fn decode_events(
    kind: EventKind,
    raw: &[serde_json::Value],
) -> Result<Vec<LedgerEvent>, EventDecodeError> {
    raw.iter()
        .enumerate()
        .map(|(index, value)| decode_event(kind, index, value))
        .collect()
}

fn field_names(raw: &serde_json::Value) -> String {
    match raw.as_object() {
        Some(map) => map.keys().cloned().collect::<Vec<_>>().join(","),
        None => format!("<{}>", json_type_name(raw)),
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_legacy_supply_with_string_amounts() {
        let raw = json!({"shares": "1000", "amount": 1000, "timestamp": 1_700_000_000_000i64});
        let event = decode_event(EventKind::Supply, 0, &raw).unwrap();
        assert_eq!(event, LedgerEvent::supply(1000, 1000, TimeMs::new(1_700_000_000_000)));
    }

    #[test]
    fn test_decode_v2_withdraw_with_rfc3339_timestamp() {
        let raw = json!({
            "sharesBurned": "300",
            "assetsWithdrawn": "360",
            "timestampMs": "2024-01-01T00:00:00Z",
            "txDigest": "abc"
        });
        let event = decode_event(EventKind::Withdraw, 0, &raw).unwrap();
        assert_eq!(event.kind, EventKind::Withdraw);
        assert_eq!(event.shares_delta, 300);
        assert_eq!(event.base_units_delta, 360);
        assert_eq!(event.timestamp, TimeMs::new(1_704_067_200_000));
    }

    #[test]
    fn test_withdraw_layout_is_not_accepted_as_supply() {
        let raw = json!({"sharesBurned": "1", "assetsWithdrawn": "1", "timestampMs": 1});
        let err = decode_event(EventKind::Supply, 3, &raw).unwrap_err();
        match err {
            EventDecodeError::UnrecognizedShape { kind, index, fields } => {
                assert_eq!(kind, EventKind::Supply);
                assert_eq!(index, 3);
                assert!(fields.contains("sharesBurned"));
            }
            other => panic!("Expected UnrecognizedShape, got {:?}", other),
        }
    }

    #[test]
    fn test_negative_amount_is_invalid_field() {
        let raw = json!({"shares": "-5", "amount": "10", "timestamp": 1});
        let err = decode_event(EventKind::Supply, 0, &raw).unwrap_err();
        assert!(matches!(
            err,
            EventDecodeError::InvalidField { field: "shares", .. }
        ));
    }

    #[test]
    fn test_one_bad_record_rejects_page() {
        let raw = vec![
            json!({"shares": 1, "amount": 1, "timestamp": 1}),
            json!("garbage"),
        ];
        let err = decode_events(EventKind::Supply, &raw).unwrap_err();
        assert!(matches!(err, EventDecodeError::UnrecognizedShape { index: 1, .. }));
    }
}
