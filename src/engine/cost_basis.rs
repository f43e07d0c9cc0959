use crate::domain::{LedgerEvent, PositionKey, TimeMs};
use thiserror::Error;

/// Fixed-point scale for the average cost per share.
pub const COST_SCALE: u128 = 1_000_000_000_000;

/// Weighted-average cost accounting folded from a position's full history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CostBasisRecord {
    pub position_key: PositionKey,
    /// Sum of base units paid in across all supply events.
    pub total_supplied_base_units: u128,
    /// Sum of shares minted across all supply events.
    pub total_shares_acquired: u128,
    /// Cost still attributed to held shares after withdrawals.
    pub net_cost: u128,
    /// Shares still held according to the index.
    pub net_shares: u128,
}

impl CostBasisRecord {
    /// Average cost per share scaled by [`COST_SCALE`]. Zero once the position is empty.
    pub fn avg_cost_per_share_scaled(&self) -> u128 {
        if self.net_shares == 0 || self.net_cost == 0 {
            return 0;
        }
        self.net_cost.saturating_mul(COST_SCALE) / self.net_shares
    }

    /// Base units originally paid for `current_shares` at the blended average cost.
    pub fn original_value(&self, current_shares: u64) -> u64 {
        let avg = self.avg_cost_per_share_scaled();
        if avg == 0 {
            return 0;
        }
        let value = u128::from(current_shares).saturating_mul(avg) / COST_SCALE;
        u64::try_from(value).unwrap_or(u64::MAX)
    }
}

/// Result of folding indexed history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CostBasisOutcome {
    /// The index has no supply events for this position yet.
    NoIndexData,
    Known(CostBasisRecord),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CostBasisError {
    #[error(
        "ledger inconsistency: withdrawal of {withdrawn_shares} shares at {}ms exceeds {net_shares} tracked shares",
        .at.as_ms()
    )]
    LedgerInconsistency {
        withdrawn_shares: u64,
        net_shares: u128,
        at: TimeMs,
    },
}

/// Fold supply and withdraw history into a weighted-average cost basis.
///
/// Deposits are summed first. Withdrawals are then applied in timestamp order,
/// each removing a pro-rata slice of the remaining cost (truncating, like the
/// on-chain ledger). A withdrawal larger than the shares left is reported, not
/// clamped.
pub fn compute_cost_basis(
    position_key: &PositionKey,
    deposits: &[LedgerEvent],
    withdrawals: &[LedgerEvent],
) -> Result<CostBasisOutcome, CostBasisError> {
    if deposits.is_empty() {
        return Ok(CostBasisOutcome::NoIndexData);
    }

    let total_supplied_base_units: u128 = deposits
        .iter()
        .map(|d| u128::from(d.base_units_delta))
        .sum();
    let total_shares_acquired: u128 = deposits.iter().map(|d| u128::from(d.shares_delta)).sum();

    let mut ordered: Vec<&LedgerEvent> = withdrawals.iter().collect();
    ordered.sort_by_key(|w| w.timestamp);

    let mut net_cost = total_supplied_base_units;
    let mut net_shares = total_shares_acquired;

    for withdrawal in ordered {
        if net_shares == 0 {
            tracing::debug!(
                position_key = %position_key.short(),
                shares = withdrawal.shares_delta,
                "Skipping withdrawal after position emptied"
            );
            continue;
        }

        let shares = u128::from(withdrawal.shares_delta);
        if shares > net_shares {
            return Err(CostBasisError::LedgerInconsistency {
                withdrawn_shares: withdrawal.shares_delta,
                net_shares,
                at: withdrawal.timestamp,
            });
        }

        let cost_to_remove = net_cost.saturating_mul(shares) / net_shares;
        net_cost -= cost_to_remove;
        net_shares -= shares;
    }

    if net_shares == 0 {
        net_cost = 0;
    }

    Ok(CostBasisOutcome::Known(CostBasisRecord {
        position_key: position_key.clone(),
        total_supplied_base_units,
        total_shares_acquired,
        net_cost,
        net_shares,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ObjectId;

    fn key() -> PositionKey {
        ObjectId::parse("0xcafe").unwrap()
    }

    fn known(outcome: CostBasisOutcome) -> CostBasisRecord {
        match outcome {
            CostBasisOutcome::Known(record) => record,
            CostBasisOutcome::NoIndexData => panic!("Expected Known cost basis"),
        }
    }

    #[test]
    fn test_no_deposits_is_sentinel_not_zero() {
        let withdrawals = vec![LedgerEvent::withdraw(10, 10, TimeMs::new(1))];
        let outcome = compute_cost_basis(&key(), &[], &withdrawals).unwrap();
        assert_eq!(outcome, CostBasisOutcome::NoIndexData);
    }

    #[test]
    fn test_half_withdrawal_removes_half_cost() {
        let deposits = vec![LedgerEvent::supply(100, 100, TimeMs::new(1))];
        let withdrawals = vec![LedgerEvent::withdraw(50, 55, TimeMs::new(2))];
        let record = known(compute_cost_basis(&key(), &deposits, &withdrawals).unwrap());
        assert_eq!(record.net_shares, 50);
        assert_eq!(record.net_cost, 50);
        assert_eq!(record.original_value(50), 50);
    }

    #[test]
    fn test_blended_average_across_deposits() {
        // 100 shares for 100, then 100 shares for 300: average 2 per share.
        let deposits = vec![
            LedgerEvent::supply(100, 100, TimeMs::new(1)),
            LedgerEvent::supply(100, 300, TimeMs::new(2)),
        ];
        let record = known(compute_cost_basis(&key(), &deposits, &[]).unwrap());
        assert_eq!(record.total_supplied_base_units, 400);
        assert_eq!(record.total_shares_acquired, 200);
        assert_eq!(record.avg_cost_per_share_scaled(), 2 * COST_SCALE);
        assert_eq!(record.original_value(150), 300);
    }

    #[test]
    fn test_full_withdrawal_collapses_to_zero() {
        let deposits = vec![LedgerEvent::supply(1000, 1000, TimeMs::new(1))];
        let withdrawals = vec![
            LedgerEvent::withdraw(400, 410, TimeMs::new(2)),
            LedgerEvent::withdraw(600, 620, TimeMs::new(3)),
        ];
        let record = known(compute_cost_basis(&key(), &deposits, &withdrawals).unwrap());
        assert_eq!(record.net_shares, 0);
        assert_eq!(record.net_cost, 0);
        assert_eq!(record.original_value(0), 0);
        assert_eq!(record.original_value(500), 0);
    }

    #[test]
    fn test_withdrawals_after_empty_are_skipped() {
        let deposits = vec![LedgerEvent::supply(10, 10, TimeMs::new(1))];
        let withdrawals = vec![
            LedgerEvent::withdraw(10, 10, TimeMs::new(2)),
            LedgerEvent::withdraw(5, 5, TimeMs::new(3)),
        ];
        let record = known(compute_cost_basis(&key(), &deposits, &withdrawals).unwrap());
        assert_eq!(record.net_shares, 0);
    }

    #[test]
    fn test_withdrawals_fold_in_timestamp_order() {
        let deposits = vec![LedgerEvent::supply(3, 10, TimeMs::new(1))];
        // Delivered out of order; folding by time gives 10 - floor(10*1/3)=7, then 7 - floor(7*1/2)=4.
        let withdrawals = vec![
            LedgerEvent::withdraw(1, 0, TimeMs::new(30)),
            LedgerEvent::withdraw(1, 0, TimeMs::new(20)),
        ];
        let record = known(compute_cost_basis(&key(), &deposits, &withdrawals).unwrap());
        assert_eq!(record.net_shares, 1);
        assert_eq!(record.net_cost, 4);
    }

    #[test]
    fn test_scaled_average_truncates_original_value() {
        let deposits = vec![LedgerEvent::supply(1500, 1600, TimeMs::new(1))];
        let withdrawals = vec![LedgerEvent::withdraw(300, 380, TimeMs::new(2))];
        let record = known(compute_cost_basis(&key(), &deposits, &withdrawals).unwrap());
        assert_eq!(record.net_cost, 1280);
        assert_eq!(record.net_shares, 1200);
        assert_eq!(record.avg_cost_per_share_scaled(), 1_066_666_666_666);
        // 1200 * 1_066_666_666_666 / 1e12 rounds down, one unit below net_cost.
        assert_eq!(record.original_value(1200), 1279);
    }

    #[test]
    fn test_overdrawn_ledger_is_reported() {
        let deposits = vec![LedgerEvent::supply(100, 100, TimeMs::new(1))];
        let withdrawals = vec![LedgerEvent::withdraw(150, 150, TimeMs::new(2))];
        let err = compute_cost_basis(&key(), &deposits, &withdrawals).unwrap_err();
        assert_eq!(
            err,
            CostBasisError::LedgerInconsistency {
                withdrawn_shares: 150,
                net_shares: 100,
                at: TimeMs::new(2),
            }
        );
    }
}
