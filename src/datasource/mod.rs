//! External data seams: the simulated on-chain query and the event indexer.

use crate::domain::{EventDecodeError, EventKind, LedgerEvent, PoolId, PositionKey};
use async_trait::async_trait;
use std::fmt;

pub mod call_graph;
pub mod indexer;
pub mod mock;
pub mod rpc;

pub use call_graph::{
    decode_u64_le, CallArg, CallGraph, CallInput, CallResult, ExecutionStatus, ReturnValue,
    SimulationResponse, ViewCall, ViewTarget,
};
pub use indexer::HttpIndexer;
pub use mock::{MockChainClient, MockIndexer};
pub use rpc::RpcChainClient;

/// Synchronous chain state, read through simulated execution.
///
/// One `simulate` call is one network round-trip regardless of graph size.
#[async_trait]
pub trait ChainClient: Send + Sync + fmt::Debug {
    /// Execute `graph` without mutating state or charging a fee.
    ///
    /// A transport or RPC failure is an `Err`; an execution that ran but did
    /// not succeed is an `Ok` with a failure status.
    async fn simulate(&self, graph: &CallGraph) -> Result<SimulationResponse, DataSourceError>;
}

/// Eventually-consistent history of supply and withdraw events.
#[async_trait]
pub trait IndexerSource: Send + Sync + fmt::Debug {
    /// Fetch every event of `query.kind` for one position, up to `query.limit`.
    ///
    /// Ordering is not guaranteed.
    async fn fetch_events(&self, query: &EventQuery) -> Result<Vec<LedgerEvent>, DataSourceError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventQuery {
    pub pool_id: PoolId,
    pub position_key: PositionKey,
    pub kind: EventKind,
    pub limit: usize,
}

/// Error type for data source operations.
#[derive(Debug, Clone)]
pub enum DataSourceError {
    /// Network error (e.g., connection timeout, DNS failure)
    NetworkError(String),
    /// HTTP error (e.g., 429 rate limit, 5xx server error)
    HttpError { status: u16, message: String },
    /// JSON-RPC level error returned by the node
    RpcError { code: i64, message: String },
    /// Parsing error (invalid JSON or malformed response)
    ParseError(String),
    /// Event record matched none of the known layouts
    UnrecognizedEvent(EventDecodeError),
    /// Rate limit exceeded (caller should implement backoff)
    RateLimited,
}

impl fmt::Display for DataSourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSourceError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            DataSourceError::HttpError { status, message } => {
                write!(f, "HTTP error {}: {}", status, message)
            }
            DataSourceError::RpcError { code, message } => {
                write!(f, "RPC error {}: {}", code, message)
            }
            DataSourceError::ParseError(msg) => write!(f, "Parse error: {}", msg),
            DataSourceError::UnrecognizedEvent(err) => write!(f, "Event decode error: {}", err),
            DataSourceError::RateLimited => write!(f, "Rate limited"),
        }
    }
}

impl std::error::Error for DataSourceError {}

impl From<EventDecodeError> for DataSourceError {
    fn from(err: EventDecodeError) -> Self {
        DataSourceError::UnrecognizedEvent(err)
    }
}
