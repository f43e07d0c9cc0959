pub mod batcher;
pub mod cache;
pub mod cost_basis;
pub mod driver;
pub mod reconciler;

pub use batcher::{ValueBatcher, ValueQuery, ViewRequest};
pub use cache::{CacheEntry, DueRetry, EnrichedSnapshot, EnrichmentCache};
pub use cost_basis::{CostBasisFetcher, FetchError};
pub use driver::Driver;
pub use reconciler::{PassOutcome, PassReport, ReconcileRequest, Reconciler, TickReport};
