//! Central admission server: a single FCFS queue granting exclusive
//! intersection access to vehicles running the Serial policy.

use anyhow::Result;
use axum::routing::get;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use imc_server::config::Config;
use imc_server::state::AppState;
use imc_server::{api, loops};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("imc_server=debug".parse()?),
        )
        .init();

    tracing::info!("Starting admission server...");

    let config = Config::from_env();
    let state = Arc::new(AppState::new(config.queue_capacity));

    tokio::spawn(loops::grant_loop::run_grant_loop(
        state.clone(),
        Duration::from_millis(config.grant_tick_ms),
    ));

    let app = api::routes()
        .route("/health", get(|| async { "OK" }))
        .with_state(state)
        .layer(CorsLayer::permissive());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
