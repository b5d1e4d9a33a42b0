use std::net::SocketAddr;
use std::sync::atomic::Ordering;

use axum::Router;
use axum::extract::State;
use axum::routing::get;
use axum::Json;
use chrono::Utc;
use serde_json::{Value, json};
use tracing::info;

use crate::state::AppState;

pub fn health_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .with_state(state)
}

pub async fn serve_health(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("health endpoint on http://{addr}/health");
    axum::serve(listener, health_router(state)).await?;
    Ok(())
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(health_payload(&state))
}

/// Shared between GET /health and the `health_check` tool.
pub fn health_payload(state: &AppState) -> Value {
    let store_ok = state
        .db
        .lock()
        .map(|db| db.probe().is_ok())
        .unwrap_or(false);
    let bridge_tools = state.registry.len();
    let filesystem_ok = {
        let probe = state.config.data_dir.join(".health-probe");
        let ok = std::fs::write(&probe, b"ok").is_ok();
        let _ = std::fs::remove_file(&probe);
        ok
    };

    let status = if !store_ok {
        "unhealthy"
    } else if bridge_tools == 0 || !filesystem_ok {
        "degraded"
    } else {
        "healthy"
    };

    json!({
        "status": status,
        "timestamp": Utc::now().to_rfc3339(),
        "uptime": state.started_at.elapsed().as_secs(),
        "checks": {
            "store": if store_ok { "ok" } else { "error" },
            "bus": {
                "listening": true,
                "connected_clients": state.connected_clients.load(Ordering::Relaxed),
            },
            "bridge": { "tools": bridge_tools },
            "filesystem": {
                "data_dir": state.config.data_dir.display().to_string(),
                "workspace_root": state.config.workspace_root.display().to_string(),
                "writable": filesystem_ok,
            },
        },
    })
}
