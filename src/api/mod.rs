pub mod health;
pub mod positions;

use crate::config::Config;
use crate::orchestration::{Driver, Reconciler};
use axum::{
    routing::{get, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub reconciler: Arc<Reconciler>,
    pub driver: Arc<Driver>,
    pub config: Config,
}

impl AppState {
    pub fn new(reconciler: Arc<Reconciler>, driver: Arc<Driver>, config: Config) -> Self {
        Self {
            reconciler,
            driver,
            config,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/positions", put(positions::put_positions))
        .route("/v1/positions/enriched", get(positions::get_enriched))
        .route(
            "/v1/positions/enriched/:key",
            get(positions::get_enriched_position),
        )
        .layer(cors)
        .with_state(state)
}
