use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use lastmile_server::arrivals::spawn_arrival_worker;
use lastmile_server::config::ServerConfig;
use lastmile_server::notify::LogNotifier;
use lastmile_server::orchestrator::Orchestrator;
use lastmile_server::store::{InMemoryDirectory, InMemoryLedger, InMemoryRegistry};
use lastmile_server::web::{AppState, create_router};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env();

    let orchestrator = Orchestrator::new(
        Arc::new(InMemoryDirectory::new()),
        Arc::new(InMemoryRegistry::new()),
        Arc::new(InMemoryLedger::new()),
        LogNotifier,
        config.matching.clone(),
    );

    // Arrival events from the HTTP intake are matched in the background
    let (arrivals_tx, arrivals_rx) = mpsc::channel(config.arrival_queue);
    spawn_arrival_worker(orchestrator.clone(), arrivals_rx, config.arrival_concurrency);

    let app = create_router(AppState::new(orchestrator, arrivals_tx));

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    info!(addr = %config.addr, "last-mile matcher listening");
    info!("  GET  /health                    - Health check");
    info!("  POST /api/rider/request         - Create a rider request");
    info!("  GET  /api/rider/requests        - Pending requests at a station");
    info!("  POST /api/driver/route          - Register a route");
    info!("  POST /api/driver/arrival        - Queue a driver arrival");
    info!("  POST /api/match                 - Match now");
    info!("  POST /api/trips/:id/<action>    - start, complete or cancel a trip");

    axum::serve(listener, app).await?;
    Ok(())
}
