//! One-round-trip batching of view calls with ordered demultiplexing.

use crate::datasource::{CallArg, CallGraph, ChainClient, SimulationResponse, ViewTarget};
use crate::domain::{ObjectId, PoolId, PositionKey};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use tracing::{debug, warn};

/// Inputs for one current-value lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueQuery {
    pub pool_id: PoolId,
    pub position_key: PositionKey,
    pub asset_type: Option<String>,
}

/// A view call described by target and object arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewRequest {
    pub target: ViewTarget,
    pub type_arguments: Vec<String>,
    pub objects: Vec<ObjectId>,
}

/// Batches independent (or chained) view calls into a single simulated execution.
///
/// Never fails: transport errors and non-success executions are logged and
/// produce an empty map. A missing key means "unknown", never zero.
#[derive(Debug, Clone)]
pub struct ValueBatcher {
    chain: Arc<dyn ChainClient>,
    value_target: ViewTarget,
}

impl ValueBatcher {
    pub fn new(chain: Arc<dyn ChainClient>, value_target: ViewTarget) -> Self {
        Self {
            chain,
            value_target,
        }
    }

    /// Current redeemable value per position, one round-trip for the whole list.
    pub async fn fetch_current_values(&self, queries: &[ValueQuery]) -> HashMap<PositionKey, u64> {
        if queries.is_empty() {
            return HashMap::new();
        }

        let mut graph = CallGraph::new();
        for query in queries {
            let pool = graph.object(&query.pool_id);
            let key = graph.object(&query.position_key);
            graph.call(
                self.value_target.clone(),
                query.asset_type.iter().cloned().collect(),
                vec![pool, key],
            );
        }

        let Some(response) = self.execute(&graph).await else {
            return HashMap::new();
        };

        let mut values = HashMap::with_capacity(queries.len());
        for (query, result) in queries.iter().zip(&response.results) {
            match result.first_u64() {
                Some(value) => {
                    values.insert(query.position_key.clone(), value);
                }
                None => debug!(
                    position_key = %query.position_key.short(),
                    "No decodable u64 in batch result"
                ),
            }
        }
        values
    }

    /// Chained variant: call 0 yields a handle that every dependent call takes first.
    ///
    /// Dependent results are keyed by the caller's labels.
    pub async fn fetch_chained_values<L>(
        &self,
        root: &ViewRequest,
        dependents: &[(L, ViewRequest)],
    ) -> HashMap<L, u64>
    where
        L: Eq + Hash + Clone,
    {
        if dependents.is_empty() {
            return HashMap::new();
        }

        let mut graph = CallGraph::new();
        let root_args = root.objects.iter().map(|id| graph.object(id)).collect();
        let handle = graph.call(root.target.clone(), root.type_arguments.clone(), root_args);

        for (_, request) in dependents {
            let mut args: Vec<CallArg> = vec![handle];
            args.extend(request.objects.iter().map(|id| graph.object(id)));
            graph.call(request.target.clone(), request.type_arguments.clone(), args);
        }

        let Some(response) = self.execute(&graph).await else {
            return HashMap::new();
        };

        dependents
            .iter()
            .zip(response.results.iter().skip(1))
            .filter_map(|((label, _), result)| result.first_u64().map(|v| (label.clone(), v)))
            .collect()
    }

    /// Run the graph; `None` on any failure or misaligned result list.
    async fn execute(&self, graph: &CallGraph) -> Option<SimulationResponse> {
        let response = match self.chain.simulate(graph).await {
            Ok(response) => response,
            Err(e) => {
                warn!(calls = graph.len(), error = %e, "Batched view query failed");
                return None;
            }
        };

        if !response.is_success() {
            warn!(calls = graph.len(), status = ?response.status, "Batched view query did not succeed");
            return None;
        }
        if response.results.len() != graph.len() {
            warn!(
                calls = graph.len(),
                results = response.results.len(),
                "Batched view query returned misaligned results"
            );
            return None;
        }

        Some(response)
    }
}
