use crate::datasource::{DataSourceError, EventQuery, IndexerSource};
use crate::domain::{EventKind, Position};
use crate::engine::{compute_cost_basis, CostBasisError, CostBasisOutcome};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error(transparent)]
    DataSource(#[from] DataSourceError),
    #[error(transparent)]
    Ledger(#[from] CostBasisError),
    #[error("cost-basis task aborted: {0}")]
    Aborted(String),
}

/// Fetches a position's history from the indexer and folds it into a cost basis.
#[derive(Debug, Clone)]
pub struct CostBasisFetcher {
    indexer: Arc<dyn IndexerSource>,
    event_limit: usize,
    require_share_match: bool,
}

impl CostBasisFetcher {
    pub fn new(indexer: Arc<dyn IndexerSource>, event_limit: usize) -> Self {
        Self {
            indexer,
            event_limit,
            require_share_match: false,
        }
    }

    /// Treat an index whose net shares disagree with the chain as not caught up.
    pub fn require_share_match(mut self, enabled: bool) -> Self {
        self.require_share_match = enabled;
        self
    }

    fn query(&self, position: &Position, kind: EventKind) -> EventQuery {
        EventQuery {
            pool_id: position.pool_id.clone(),
            position_key: position.position_key.clone(),
            kind,
            limit: self.event_limit,
        }
    }

    pub async fn fetch(&self, position: &Position) -> Result<CostBasisOutcome, FetchError> {
        let supply_query = self.query(position, EventKind::Supply);
        let withdraw_query = self.query(position, EventKind::Withdraw);
        let (supplies, withdrawals) = tokio::try_join!(
            self.indexer.fetch_events(&supply_query),
            self.indexer.fetch_events(&withdraw_query),
        )?;

        let outcome = compute_cost_basis(&position.position_key, &supplies, &withdrawals)?;

        if let CostBasisOutcome::Known(record) = &outcome {
            if self.require_share_match && record.net_shares != u128::from(position.share_count) {
                tracing::debug!(
                    position_key = %position.position_key.short(),
                    indexed_shares = %record.net_shares,
                    chain_shares = position.share_count,
                    "Index behind chain share count"
                );
                return Ok(CostBasisOutcome::NoIndexData);
            }
        }

        Ok(outcome)
    }
}
