//! Domain types for lending position enrichment.
//!
//! This module provides:
//! - Domain primitives: TimeMs, ObjectId, AssetSymbol
//! - Positions, pool totals and the enriched per-position result
//! - Typed decoding of indexed supply/withdraw events
//! - Base-unit display formatting via rust_decimal

pub mod decimal;
pub mod event;
pub mod position;
pub mod primitives;

pub use decimal::{base_units_to_decimal, format_base_units};
pub use event::{decode_event, decode_events, EventDecodeError, EventKind, LedgerEvent};
pub use position::{
    EnrichedPosition, PoolTotals, Position, ReconciliationState, RetryState, ValueSource,
};
pub use primitives::{AssetSymbol, ObjectId, ObjectIdParseError, PoolId, PositionKey, TimeMs};
