//! Reconciliation of on-chain current values with indexed cost bases.
//!
//! A pass issues one batched current-value query for every position that needs
//! work, plus one cost-basis fetch per such position, all concurrently. When the
//! indexer has not caught up, the position waits on a deadline and only its
//! cost basis is refetched by [`Reconciler::tick`]; the batch is never reissued
//! for a retry.

use super::batcher::{ValueBatcher, ValueQuery};
use super::cache::{DueRetry, EnrichedSnapshot, EnrichmentCache};
use super::cost_basis::{CostBasisFetcher, FetchError};
use crate::domain::{
    PoolId, PoolTotals, Position, PositionKey, ReconciliationState, RetryState, TimeMs,
    ValueSource,
};
use crate::engine::{shares_to_balance, CostBasisOutcome, RetryPolicy};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

/// The position set to reconcile, with optional pool totals for estimating values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileRequest {
    pub positions: Vec<Position>,
    #[serde(default)]
    pub pools: HashMap<PoolId, PoolTotals>,
}

impl ReconcileRequest {
    pub fn new(positions: Vec<Position>) -> Self {
        Self {
            positions,
            pools: HashMap::new(),
        }
    }

    pub fn with_pool(mut self, pool_id: PoolId, totals: PoolTotals) -> Self {
        self.pools.insert(pool_id, totals);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Positions fetched from scratch this pass.
    pub fetched: usize,
    /// Positions served from cache without any network call.
    pub reused: usize,
    /// Cached positions no longer in the set.
    pub dropped: usize,
    pub settled: usize,
    pub waiting: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// Another pass was in flight; this request was dropped.
    Skipped,
    Completed(PassReport),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub attempted: usize,
    pub settled: usize,
    pub rescheduled: usize,
    pub exhausted: usize,
    pub failed: usize,
}

/// Resets the in-flight flag when the pass ends, however it ends.
struct PassGuard<'a>(&'a AtomicBool);

impl<'a> PassGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| PassGuard(flag))
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Reconciler {
    batcher: ValueBatcher,
    cost_basis: Arc<CostBasisFetcher>,
    policy: RetryPolicy,
    cache: Mutex<EnrichmentCache>,
    pass_in_flight: AtomicBool,
    published: watch::Sender<Arc<EnrichedSnapshot>>,
}

impl Reconciler {
    pub fn new(batcher: ValueBatcher, cost_basis: CostBasisFetcher, policy: RetryPolicy) -> Self {
        let (published, _) = watch::channel(Arc::new(EnrichedSnapshot::new()));
        Self {
            batcher,
            cost_basis: Arc::new(cost_basis),
            policy,
            cache: Mutex::new(EnrichmentCache::new()),
            pass_in_flight: AtomicBool::new(false),
            published,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> Arc<EnrichedSnapshot> {
        self.published.borrow().clone()
    }

    /// Receiver notified on every publish.
    pub fn subscribe(&self) -> watch::Receiver<Arc<EnrichedSnapshot>> {
        self.published.subscribe()
    }

    pub fn is_pass_in_flight(&self) -> bool {
        self.pass_in_flight.load(Ordering::Acquire)
    }

    pub async fn retry_state(&self, key: &PositionKey) -> Option<RetryState> {
        self.cache.lock().await.get(key).and_then(|entry| entry.retry)
    }

    pub async fn pending_retries(&self) -> usize {
        self.cache.lock().await.pending_retries()
    }

    /// Drop every cached result and pending retry. In-flight work for the old
    /// entries is discarded when it lands.
    pub async fn reset(&self) {
        let mut cache = self.cache.lock().await;
        cache.clear();
        self.publish(&cache);
        info!("Reconciler reset; all cached positions and retries cleared");
    }

    fn publish(&self, cache: &EnrichmentCache) {
        self.published.send_replace(Arc::new(cache.snapshot()));
    }

    /// Run one reconciliation pass over `request`.
    ///
    /// At most one pass runs at a time; a call made while one is in flight
    /// returns [`PassOutcome::Skipped`] immediately.
    pub async fn reconcile(&self, request: &ReconcileRequest, now: TimeMs) -> PassOutcome {
        let Some(_guard) = PassGuard::acquire(&self.pass_in_flight) else {
            debug!("Reconciliation pass already in flight; dropping request");
            return PassOutcome::Skipped;
        };

        let mut report = PassReport::default();
        let mut work: Vec<(Position, u64)> = Vec::new();
        {
            let mut cache = self.cache.lock().await;
            let keep: HashSet<PositionKey> = request
                .positions
                .iter()
                .map(|p| p.position_key.clone())
                .collect();
            report.dropped = cache.retain_keys(&keep);

            for position in &request.positions {
                if cache.is_reusable(position) {
                    report.reused += 1;
                    continue;
                }
                let epoch = cache.begin_epoch(position);
                if position.is_dormant() {
                    // Nothing held: both sides are zero by definition.
                    if let Some(entry) = cache.epoch_entry_mut(&position.position_key, epoch) {
                        entry.enriched.set_current_value(0, ValueSource::OnChain);
                        entry.enriched.set_original_value(0);
                        entry.enriched.reconciliation_state = ReconciliationState::Settled;
                    }
                    report.settled += 1;
                    continue;
                }
                work.push((position.clone(), epoch));
            }
            self.publish(&cache);
        }

        report.fetched = work.len();
        if work.is_empty() {
            return PassOutcome::Completed(report);
        }

        let queries: Vec<ValueQuery> = work
            .iter()
            .map(|(p, _)| ValueQuery {
                pool_id: p.pool_id.clone(),
                position_key: p.position_key.clone(),
                asset_type: p.asset_type.clone(),
            })
            .collect();

        let (values, cost_bases) = tokio::join!(
            self.batcher.fetch_current_values(&queries),
            self.fetch_cost_bases(work.iter().map(|(p, _)| p.clone()).collect()),
        );

        let mut cache = self.cache.lock().await;
        for ((position, epoch), cost_basis) in work.iter().zip(cost_bases) {
            let key = &position.position_key;
            let Some(entry) = cache.epoch_entry_mut(key, *epoch) else {
                debug!(position_key = %key.short(), "Discarding pass result for superseded epoch");
                continue;
            };

            let current = values
                .get(key)
                .map(|v| (*v, ValueSource::OnChain))
                .or_else(|| {
                    request
                        .pools
                        .get(&position.pool_id)
                        .and_then(|totals| shares_to_balance(position.share_count, totals))
                        .map(|value| (value, ValueSource::Estimated))
                });
            if let Some((value, source)) = current {
                entry.enriched.set_current_value(value, source);
            }

            let state = match cost_basis {
                Ok(CostBasisOutcome::Known(record)) => {
                    entry
                        .enriched
                        .set_original_value(record.original_value(position.share_count));
                    if current.is_some() {
                        ReconciliationState::Settled
                    } else {
                        ReconciliationState::Loading
                    }
                }
                Ok(CostBasisOutcome::NoIndexData) if current.is_none() => ReconciliationState::Loading,
                Ok(CostBasisOutcome::NoIndexData) => {
                    if self.policy.allows_another(1) {
                        let delay = self.policy.delay_ms(0);
                        entry.retry = Some(RetryState {
                            attempt: 1,
                            next_deadline: Some(now.plus_ms(delay)),
                        });
                        debug!(position_key = %key.short(), delay_ms = delay, "Index lagging; retry scheduled");
                        ReconciliationState::WaitingOnIndex
                    } else {
                        ReconciliationState::Exhausted
                    }
                }
                Err(e) => {
                    warn!(position_key = %key.short(), error = %e, "Cost-basis fetch failed");
                    entry.enriched.last_error = Some(e.to_string());
                    ReconciliationState::Failed
                }
            };
            entry.enriched.reconciliation_state = state;

            match state {
                ReconciliationState::Settled => report.settled += 1,
                ReconciliationState::WaitingOnIndex => report.waiting += 1,
                ReconciliationState::Failed => report.failed += 1,
                _ => {}
            }
        }
        self.publish(&cache);

        info!(
            fetched = report.fetched,
            reused = report.reused,
            settled = report.settled,
            waiting = report.waiting,
            failed = report.failed,
            "Reconciliation pass complete"
        );
        PassOutcome::Completed(report)
    }

    /// Refetch the cost basis of every position whose retry deadline has passed.
    ///
    /// Independent of the pass guard: retries never wait on, or block, a pass.
    pub async fn tick(&self, now: TimeMs) -> TickReport {
        let due: Vec<DueRetry> = self.cache.lock().await.take_due(now);
        let mut report = TickReport {
            attempted: due.len(),
            ..Default::default()
        };
        if due.is_empty() {
            return report;
        }

        let results = self
            .fetch_cost_bases(due.iter().map(|d| d.position.clone()).collect())
            .await;

        let mut cache = self.cache.lock().await;
        for (retry, result) in due.iter().zip(results) {
            let key = &retry.position.position_key;
            let Some(entry) = cache.epoch_entry_mut(key, retry.epoch) else {
                debug!(position_key = %key.short(), "Discarding retry result for superseded epoch");
                continue;
            };
            if entry.enriched.reconciliation_state != ReconciliationState::WaitingOnIndex {
                continue;
            }

            match result {
                Ok(CostBasisOutcome::Known(record)) => {
                    entry
                        .enriched
                        .set_original_value(record.original_value(retry.position.share_count));
                    entry.enriched.reconciliation_state = ReconciliationState::Settled;
                    entry.retry = None;
                    report.settled += 1;
                    debug!(position_key = %key.short(), attempt = retry.attempt + 1, "Index caught up");
                }
                Ok(CostBasisOutcome::NoIndexData) => {
                    let failed = retry.attempt + 1;
                    if self.policy.allows_another(failed) {
                        let delay = self.policy.delay_ms(failed - 1);
                        entry.retry = Some(RetryState {
                            attempt: failed,
                            next_deadline: Some(now.plus_ms(delay)),
                        });
                        report.rescheduled += 1;
                        debug!(position_key = %key.short(), attempt = failed, delay_ms = delay, "Index still lagging");
                    } else {
                        entry.enriched.reconciliation_state = ReconciliationState::Exhausted;
                        entry.retry = None;
                        report.exhausted += 1;
                        warn!(position_key = %key.short(), attempts = failed, "Retry budget exhausted without index data");
                    }
                }
                Err(e) => {
                    warn!(position_key = %key.short(), error = %e, "Cost-basis retry failed");
                    entry.enriched.last_error = Some(e.to_string());
                    entry.enriched.reconciliation_state = ReconciliationState::Failed;
                    entry.retry = None;
                    report.failed += 1;
                }
            }
        }
        self.publish(&cache);
        report
    }

    /// One task per position so a panic in one fetch only fails that position.
    async fn fetch_cost_bases(
        &self,
        positions: Vec<Position>,
    ) -> Vec<Result<CostBasisOutcome, FetchError>> {
        let handles = positions.into_iter().map(|position| {
            let fetcher = self.cost_basis.clone();
            tokio::spawn(async move { fetcher.fetch(&position).await })
        });

        join_all(handles)
            .await
            .into_iter()
            .map(|joined| joined.unwrap_or_else(|e| Err(FetchError::Aborted(e.to_string()))))
            .collect()
    }
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("policy", &self.policy)
            .field("pass_in_flight", &self.is_pass_in_flight())
            .finish_non_exhaustive()
    }
}
