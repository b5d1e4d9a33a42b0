use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};

use cadence_server::health::health_router;
use cadence_server::{Cli, Config, build_state, bus_router, logging};

/// Grace period for draining in-flight tool calls at shutdown.
const DRAIN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::resolve(cli)?;
    logging::init(&config);

    let bus_addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("invalid MAIN_HOST/MAIN_PORT")?;
    let health_addr: SocketAddr = format!("{}:{}", config.host, config.health_port)
        .parse()
        .context("invalid HEALTH_PORT")?;

    log_startup_paths(&config);
    let state = build_state(config)?;

    // Bind before serving so port conflicts fail startup with a non-zero
    // exit instead of a half-alive process.
    let bus_listener = TcpListener::bind(bus_addr)
        .await
        .with_context(|| format!("bus port in use: {bus_addr}"))?;
    let health_listener = TcpListener::bind(health_addr)
        .await
        .with_context(|| format!("health port in use: {health_addr}"))?;

    info!("bus listening on ws://{bus_addr}/ws");
    info!("health endpoint on http://{health_addr}/health");
    info!(tools = state.registry.len(), "tool registry populated");

    let bus_state = state.clone();
    let bus = tokio::spawn(async move {
        axum::serve(bus_listener, bus_router(bus_state))
            .with_graceful_shutdown(shutdown_signal())
            .await
    });
    let health_state = state.clone();
    let health = tokio::spawn(async move {
        axum::serve(health_listener, health_router(health_state))
            .with_graceful_shutdown(shutdown_signal())
            .await
    });

    // Phase one: both serve loops stop accepting when the signal fires.
    // Phase two: bounded drain, then the store closes on drop.
    let (bus_result, health_result) = tokio::join!(bus, health);
    bus_result.context("bus task panicked")??;
    health_result.context("health task panicked")??;

    match tokio::time::timeout(DRAIN_GRACE, drain(&state)).await {
        Ok(()) => info!("shutdown complete"),
        Err(_) => warn!("drain grace period expired; exiting"),
    }

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown requested; draining");
}

async fn drain(state: &cadence_server::AppState) {
    use std::sync::atomic::Ordering;
    while state.connected_clients.load(Ordering::Relaxed) > 0 {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

fn log_startup_paths(config: &Config) {
    let cwd = std::env::current_dir().unwrap_or_default();
    info!(
        "startup paths: cwd={} data_dir={} db_path={} workspace_root={}",
        cwd.display(),
        config.data_dir.display(),
        config.db_path.display(),
        config.workspace_root.display()
    );
}
