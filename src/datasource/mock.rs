//! In-memory chain and indexer for testing without network calls.

use super::{
    CallArg, CallGraph, CallInput, CallResult, ChainClient, DataSourceError, EventQuery,
    ExecutionStatus, IndexerSource, ReturnValue, SimulationResponse,
};
use crate::domain::{EventKind, LedgerEvent, ObjectId, PositionKey};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Default)]
struct ChainState {
    /// Value returned by any call that takes this object as an argument.
    object_values: HashMap<ObjectId, u64>,
    /// Value returned by calls consuming an earlier result, keyed by function name.
    chained_values: HashMap<String, u64>,
    failure_status: Option<String>,
    transport_error: Option<String>,
    latency: Option<Duration>,
    graphs: Vec<CallGraph>,
}

/// Mock chain answering view calls from a value table.
///
/// Calls with no known value come back with no return values, which the
/// batcher treats as unknown.
#[derive(Debug, Default)]
pub struct MockChainClient {
    state: Mutex<ChainState>,
    simulate_calls: AtomicUsize,
}

impl MockChainClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer calls referencing `object` with `value`.
    pub fn with_value(self, object: &ObjectId, value: u64) -> Self {
        self.set_value(object, value);
        self
    }

    /// Answer chained calls to `function` with `value`.
    pub fn with_chained_value(self, function: &str, value: u64) -> Self {
        lock(&self.state)
            .chained_values
            .insert(function.to_string(), value);
        self
    }

    /// Every simulation runs but reports a failed execution.
    pub fn with_failure_status(self, error: &str) -> Self {
        lock(&self.state).failure_status = Some(error.to_string());
        self
    }

    /// Every simulation fails before reaching the node.
    pub fn with_transport_error(self, error: &str) -> Self {
        lock(&self.state).transport_error = Some(error.to_string());
        self
    }

    pub fn with_latency(self, latency: Duration) -> Self {
        lock(&self.state).latency = Some(latency);
        self
    }

    pub fn set_value(&self, object: &ObjectId, value: u64) {
        lock(&self.state).object_values.insert(object.clone(), value);
    }

    /// Number of `simulate` round-trips served.
    pub fn simulate_calls(&self) -> usize {
        self.simulate_calls.load(Ordering::SeqCst)
    }

    /// Graphs received, in arrival order.
    pub fn graphs(&self) -> Vec<CallGraph> {
        lock(&self.state).graphs.clone()
    }

    fn answer(state: &ChainState, graph: &CallGraph) -> Vec<CallResult> {
        graph
            .calls
            .iter()
            .map(|call| {
                let chained = call
                    .arguments
                    .iter()
                    .any(|arg| matches!(arg, CallArg::Result(_)));

                let value = if chained {
                    state.chained_values.get(&call.target.function).copied()
                } else {
                    call.arguments.iter().rev().find_map(|arg| match arg {
                        CallArg::Input(i) => match graph.inputs.get(usize::from(*i)) {
                            Some(CallInput::Object(id)) => state.object_values.get(id).copied(),
                            _ => None,
                        },
                        CallArg::Result(_) => None,
                    })
                };

                match value {
                    Some(v) => CallResult {
                        return_values: vec![ReturnValue::u64(v)],
                    },
                    None if !chained => CallResult {
                        // Unvalued root calls yield an object handle.
                        return_values: vec![ReturnValue {
                            bytes: vec![0u8; 32],
                            type_tag: "address".to_string(),
                        }],
                    },
                    None => CallResult::default(),
                }
            })
            .collect()
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn simulate(&self, graph: &CallGraph) -> Result<SimulationResponse, DataSourceError> {
        self.simulate_calls.fetch_add(1, Ordering::SeqCst);

        let latency = lock(&self.state).latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = lock(&self.state);
        state.graphs.push(graph.clone());

        if let Some(err) = &state.transport_error {
            return Err(DataSourceError::NetworkError(err.clone()));
        }
        if let Some(err) = &state.failure_status {
            return Ok(SimulationResponse {
                status: ExecutionStatus::Failure { error: err.clone() },
                results: Vec::new(),
            });
        }

        Ok(SimulationResponse {
            status: ExecutionStatus::Success,
            results: Self::answer(&state, graph),
        })
    }
}

#[derive(Debug, Default)]
struct IndexerState {
    supplies: HashMap<PositionKey, Vec<LedgerEvent>>,
    withdrawals: HashMap<PositionKey, Vec<LedgerEvent>>,
    /// Remaining supply queries that see no history yet.
    lag: HashMap<PositionKey, usize>,
    failing: HashSet<PositionKey>,
    supply_fetches: HashMap<PositionKey, usize>,
    latency: Option<Duration>,
}

/// Mock indexer with scriptable lag and per-position failures.
#[derive(Debug, Default)]
pub struct MockIndexer {
    state: Mutex<IndexerState>,
    total_fetches: AtomicUsize,
}

impl MockIndexer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(
        self,
        key: &PositionKey,
        supplies: Vec<LedgerEvent>,
        withdrawals: Vec<LedgerEvent>,
    ) -> Self {
        self.set_events(key, supplies, withdrawals);
        self
    }

    /// The first `fetches` supply queries for `key` return nothing.
    pub fn with_lag(self, key: &PositionKey, fetches: usize) -> Self {
        lock(&self.state).lag.insert(key.clone(), fetches);
        self
    }

    /// Every query for `key` fails with a network error.
    pub fn with_failure(self, key: &PositionKey) -> Self {
        lock(&self.state).failing.insert(key.clone());
        self
    }

    pub fn with_latency(self, latency: Duration) -> Self {
        lock(&self.state).latency = Some(latency);
        self
    }

    pub fn set_events(
        &self,
        key: &PositionKey,
        supplies: Vec<LedgerEvent>,
        withdrawals: Vec<LedgerEvent>,
    ) {
        let mut state = lock(&self.state);
        state.supplies.insert(key.clone(), supplies);
        state.withdrawals.insert(key.clone(), withdrawals);
    }

    /// Supply queries issued for `key`; one per cost-basis attempt.
    pub fn supply_fetches(&self, key: &PositionKey) -> usize {
        lock(&self.state)
            .supply_fetches
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    /// All queries issued, any kind.
    pub fn total_fetches(&self) -> usize {
        self.total_fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IndexerSource for MockIndexer {
    async fn fetch_events(&self, query: &EventQuery) -> Result<Vec<LedgerEvent>, DataSourceError> {
        self.total_fetches.fetch_add(1, Ordering::SeqCst);

        let latency = lock(&self.state).latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = lock(&self.state);
        let key = &query.position_key;

        if query.kind == EventKind::Supply {
            *state.supply_fetches.entry(key.clone()).or_default() += 1;
        }
        if state.failing.contains(key) {
            return Err(DataSourceError::NetworkError(format!(
                "indexer unreachable for {}",
                key.short()
            )));
        }

        if let Some(remaining) = state.lag.get_mut(key) {
            if *remaining > 0 {
                if query.kind == EventKind::Supply {
                    *remaining -= 1;
                }
                return Ok(Vec::new());
            }
        }

        let source = match query.kind {
            EventKind::Supply => &state.supplies,
            EventKind::Withdraw => &state.withdrawals,
        };
        Ok(source
            .get(key)
            .map(|events| events.iter().take(query.limit).copied().collect())
            .unwrap_or_default())
    }
}
