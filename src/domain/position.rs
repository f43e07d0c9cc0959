//! Lending positions and their enriched, reconciled form.

use crate::domain::{format_base_units, AssetSymbol, PoolId, PositionKey, TimeMs};
use serde::{Deserialize, Serialize};

/// A user's claim on a lending pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub pool_id: PoolId,
    pub position_key: PositionKey,
    pub asset: AssetSymbol,
    /// Current pool shares held. Zero means the position is dormant.
    pub share_count: u64,
    /// Fully qualified type of the pool's base asset, passed as the view call's type argument.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_type: Option<String>,
}

impl Position {
    pub fn new(pool_id: PoolId, position_key: PositionKey, asset: AssetSymbol, share_count: u64) -> Self {
        Self {
            pool_id,
            position_key,
            asset,
            share_count,
            asset_type: None,
        }
    }

    pub fn with_asset_type(mut self, asset_type: impl Into<String>) -> Self {
        self.asset_type = Some(asset_type.into());
        self
    }

    pub fn is_dormant(&self) -> bool {
        self.share_count == 0
    }
}

/// Aggregate supply of a pool at query time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolTotals {
    pub total_supply_base_units: u64,
    pub total_supply_shares: u64,
}

/// Where a position's current value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ValueSource {
    /// Decoded from the batched simulated query.
    OnChain,
    /// Derived from pool totals because the batch had no entry for this key.
    Estimated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReconciliationState {
    /// Current value not yet known for this epoch.
    Loading,
    /// Current value known; indexer has not caught up and a retry is scheduled.
    WaitingOnIndex,
    /// Both values known and merged.
    Settled,
    /// Retry budget spent without index data. Current value is still valid.
    Exhausted,
    /// A hard fetch failure or ledger inconsistency.
    Failed,
}

impl ReconciliationState {
    /// States that a pass leaves alone while the share count is unchanged.
    pub fn is_stable(&self) -> bool {
        matches!(
            self,
            ReconciliationState::Settled
                | ReconciliationState::Exhausted
                | ReconciliationState::WaitingOnIndex
        )
    }
}

impl std::fmt::Display for ReconciliationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ReconciliationState::Loading => "loading",
            ReconciliationState::WaitingOnIndex => "waiting_on_index",
            ReconciliationState::Settled => "settled",
            ReconciliationState::Exhausted => "exhausted",
            ReconciliationState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Per-position retry bookkeeping owned by the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    /// Failed cost-basis attempts so far, the initial fetch included.
    pub attempt: u32,
    /// When the next attempt is due. `None` while an attempt is in flight.
    pub next_deadline: Option<TimeMs>,
}

/// Output of the enrichment engine for one position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedPosition {
    pub position: Position,
    pub current_value: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_source: Option<ValueSource>,
    pub original_value: Option<u64>,
    pub interest_earned: Option<i128>,
    /// `interest_earned` in whole asset units, precision widened for small amounts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interest_display: Option<String>,
    pub reconciliation_state: ReconciliationState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl EnrichedPosition {
    /// A fresh epoch for `position`: nothing known yet.
    pub fn loading(position: Position) -> Self {
        Self {
            position,
            current_value: None,
            value_source: None,
            original_value: None,
            interest_earned: None,
            interest_display: None,
            reconciliation_state: ReconciliationState::Loading,
            last_error: None,
        }
    }

    /// Record the current value from whichever source produced it.
    pub fn set_current_value(&mut self, value: u64, source: ValueSource) {
        self.current_value = Some(value);
        self.value_source = Some(source);
        self.refresh_interest();
    }

    pub fn set_original_value(&mut self, value: u64) {
        self.original_value = Some(value);
        self.refresh_interest();
    }

    /// Recompute interest once both sides are known; clears it otherwise.
    fn refresh_interest(&mut self) {
        match (self.current_value, self.original_value) {
            (Some(current), Some(original)) => {
                let interest = i128::from(current) - i128::from(original);
                self.interest_earned = Some(interest);
                self.interest_display =
                    Some(format_base_units(interest, self.position.asset.decimals()));
            }
            _ => {
                self.interest_earned = None;
                self.interest_display = None;
            }
        }
    }
}
