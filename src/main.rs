use anyhow::Context;
use lendscope::orchestration::{CostBasisFetcher, Driver, Reconciler, ValueBatcher};
use lendscope::{api, Config, HttpIndexer, RpcChainClient};
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing_subscriber::filter::LevelFilter::INFO.into()),
        )
        .init();

    let config = Config::from_env().context("Configuration error")?;
    let port = config.port;

    let chain = Arc::new(RpcChainClient::new(config.chain_rpc_url.clone()));
    let indexer = Arc::new(HttpIndexer::new(config.indexer_url.clone()));

    let reconciler = Arc::new(Reconciler::new(
        ValueBatcher::new(chain, config.view_target.clone()),
        CostBasisFetcher::new(indexer, config.index_event_limit)
            .require_share_match(config.require_index_share_match),
        config.retry_policy,
    ));
    let driver = Arc::new(Driver::spawn(
        reconciler.clone(),
        config.refresh_interval,
        config.tick_interval,
    ));

    if let Some(seed) = config.seed.clone() {
        tracing::info!(positions = seed.positions.len(), "Submitting seed positions");
        driver.submit(seed);
    }

    let app = api::create_router(api::AppState::new(reconciler, driver.clone(), config));

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("Server error")?;

    driver.shutdown().await;
    Ok(())
}
