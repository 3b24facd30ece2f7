use std::{net::SocketAddr, time::Duration};

use anyhow::Context;

use zoo_tracker::{
    config::AppConfig, db::connection, logging::init_tracing, routes::app, session::spawn_sweeper,
    state::AppState,
};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        tracing::error!("server failed: {err:?}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cfg = AppConfig::from_env()?;
    init_tracing(&cfg.logging.rust_log);
    tracing::debug!(config = ?cfg, "configuration loaded");

    let db = connection::connect(&cfg.database).await?;
    let state = AppState::new(cfg, db);

    let _sweeper = spawn_sweeper(
        state.sessions.clone(),
        Duration::from_secs(state.config.session.sweep_interval_secs),
    );

    let addr: SocketAddr = format!("{}:{}", state.config.general.host, state.config.general.port)
        .parse()
        .context("invalid HOST/PORT")?;
    tracing::info!("listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state)).await?;
    Ok(())
}
