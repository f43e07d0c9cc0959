//! JSON-RPC client that executes call graphs in inspect (simulation) mode.

use super::{CallGraph, CallResult, ChainClient, DataSourceError, ExecutionStatus, SimulationResponse};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

/// RPC method that runs a call graph without committing it.
pub const INSPECT_METHOD: &str = "devInspectCallGraph";

/// Full-node RPC endpoint.
///
/// Exactly one HTTP request per `simulate`, with no transport-level retry.
#[derive(Debug, Clone)]
pub struct RpcChainClient {
    client: Client,
    rpc_url: String,
}

impl RpcChainClient {
    pub fn new(rpc_url: String) -> Self {
        Self {
            client: Client::new(),
            rpc_url,
        }
    }

    pub fn with_client(client: Client, rpc_url: String) -> Self {
        Self { client, rpc_url }
    }
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    result: Option<InspectResult>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct InspectResult {
    effects: InspectEffects,
    #[serde(default)]
    results: Vec<CallResult>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InspectEffects {
    status: ExecutionStatusBody,
}

#[derive(Debug, Deserialize)]
struct ExecutionStatusBody {
    status: String,
    #[serde(default)]
    error: Option<String>,
}

fn into_response(envelope: RpcEnvelope) -> Result<SimulationResponse, DataSourceError> {
    if let Some(err) = envelope.error {
        return Err(DataSourceError::RpcError {
            code: err.code,
            message: err.message,
        });
    }
    let result = envelope
        .result
        .ok_or_else(|| DataSourceError::ParseError("Missing result field".to_string()))?;

    let status = match result.effects.status.status.as_str() {
        "success" => ExecutionStatus::Success,
        _ => ExecutionStatus::Failure {
            error: result
                .effects
                .status
                .error
                .or(result.error)
                .unwrap_or_else(|| "unknown execution failure".to_string()),
        },
    };

    Ok(SimulationResponse {
        status,
        results: result.results,
    })
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn simulate(&self, graph: &CallGraph) -> Result<SimulationResponse, DataSourceError> {
        debug!(
            "Simulating call graph with {} calls, {} inputs",
            graph.calls.len(),
            graph.inputs.len()
        );

        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": INSPECT_METHOD,
            "params": [graph.sender, graph],
        });

        let response = self
            .client
            .post(&self.rpc_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| DataSourceError::NetworkError(e.to_string()))?;

        let status = response.status();
        if status == 429 {
            return Err(DataSourceError::RateLimited);
        }
        if !status.is_success() {
            return Err(DataSourceError::HttpError {
                status: status.as_u16(),
                message: status
                    .canonical_reason()
                    .unwrap_or("Unexpected status")
                    .to_string(),
            });
        }

        let envelope = response
            .json::<RpcEnvelope>()
            .await
            .map_err(|e| DataSourceError::ParseError(e.to_string()))?;

        into_response(envelope)
    }
}
