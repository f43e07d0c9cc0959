//! Pure computation: cost-basis accounting, share conversion, retry backoff.

pub mod cost_basis;
pub mod retry;
pub mod shares;

pub use cost_basis::{
    compute_cost_basis, CostBasisError, CostBasisOutcome, CostBasisRecord, COST_SCALE,
};
pub use retry::RetryPolicy;
pub use shares::{balance_to_shares, shares_to_balance, supply_ratio, RATIO_SCALE};
