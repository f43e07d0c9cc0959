pub mod api;
pub mod config;
pub mod datasource;
pub mod domain;
pub mod engine;
pub mod error;
pub mod orchestration;

pub use config::Config;
pub use datasource::{
    ChainClient, DataSourceError, HttpIndexer, IndexerSource, MockChainClient, MockIndexer,
    RpcChainClient,
};
pub use domain::{
    EnrichedPosition, ObjectId, PoolTotals, Position, ReconciliationState, TimeMs, ValueSource,
};
pub use engine::RetryPolicy;
pub use error::AppError;
pub use orchestration::{
    CostBasisFetcher, Driver, ReconcileRequest, Reconciler, ValueBatcher,
};
