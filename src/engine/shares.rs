//! Share ↔ base-unit conversion using the pool's supply ratio.
//!
//! Same fixed-point formula the lending module uses on redemption.

use crate::domain::PoolTotals;

/// Native fixed-point scale of the protocol.
pub const RATIO_SCALE: u128 = 1_000_000_000;

/// Base units per share, scaled by [`RATIO_SCALE`]. An empty pool is 1:1.
pub fn supply_ratio(totals: &PoolTotals) -> u128 {
    if totals.total_supply_shares == 0 {
        return RATIO_SCALE;
    }
    u128::from(totals.total_supply_base_units) * RATIO_SCALE
        / u128::from(totals.total_supply_shares)
}

/// Base units that `shares` currently redeem for.
///
/// `None` when the totals are inconsistent enough that the balance does not
/// fit in a u64.
pub fn shares_to_balance(shares: u64, totals: &PoolTotals) -> Option<u64> {
    let balance = u128::from(shares).checked_mul(supply_ratio(totals))? / RATIO_SCALE;
    u64::try_from(balance).ok()
}

/// Shares needed to represent `balance` base units. Inverse of [`shares_to_balance`], truncating.
pub fn balance_to_shares(balance: u64, totals: &PoolTotals) -> u64 {
    let ratio = supply_ratio(totals);
    if ratio == 0 {
        return 0;
    }
    let shares = u128::from(balance) * RATIO_SCALE / ratio;
    u64::try_from(shares).unwrap_or(u64::MAX)
}
