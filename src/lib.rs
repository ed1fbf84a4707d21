//! opsradar -- streaming anomaly radar for operational metrics and logs.
//!
//! Each tick a metric sample is scored by a rolling isolation forest, gated by
//! an incident cooldown, and explained by clustering recent log lines when an
//! incident fires.

pub mod api;
pub mod config;
pub mod detect;
pub mod event;
pub mod pipeline;
pub mod scheduler;
pub mod simulator;
pub mod storage;
pub mod summarize;

use anyhow::{Context, Result};

use crate::config::RadarConfig;

/// Start the opsradar daemon: storage, pipeline loop over the simulator, and API server.
pub async fn serve(config: &RadarConfig) -> Result<()> {
    // 1. Initialize Storage
    tracing::info!(db_path = %config.storage.db_path.display(), "Initializing database");
    let pool = storage::open_pool(&config.storage.db_path)?;
    let store = storage::SqliteStore::new(pool);

    // 2. Start Pipeline Engine (background task)
    let orchestrator = pipeline::Orchestrator::new(config, store.clone());
    let source = simulator::Simulator::new(config.simulator.seed);
    let engine = tokio::spawn(scheduler::run_pipeline_loop(
        orchestrator,
        source,
        config.pipeline.sample_interval(),
    ));

    // 3. Start API Server
    let addr: std::net::SocketAddr = config
        .api
        .bind
        .parse()
        .with_context(|| format!("invalid bind address '{}'", config.api.bind))?;
    let app = api::router(api::state::AppState { store });

    tracing::info!(%addr, "opsradar listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown requested");
        })
        .await?;

    engine.abort();
    Ok(())
}
