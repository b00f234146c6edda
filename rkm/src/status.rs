//! Read-only HTTP view of the daemon.

use anyhow::{Context, Result};
use axum::{
    self, Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::daemon::VolumeDaemon;
use crate::proxy::MountStatus;

pub fn router(daemon: VolumeDaemon) -> Router {
    Router::new()
        .route("/mounts", get(list_mounts))
        .route("/mounts/{name}", get(get_mount))
        .route("/healthz", get(healthz))
        .with_state(daemon)
}

/// Serve the status routes on `addr` until `shutdown` is cancelled.
pub async fn serve(addr: &str, daemon: VolumeDaemon, shutdown: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind status endpoint on {addr}"))?;
    info!("Serving mount status on {}", addr);
    axum::serve(listener, router(daemon))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("Status endpoint failed")
}

pub async fn list_mounts(State(daemon): State<VolumeDaemon>) -> Json<Vec<MountStatus>> {
    Json(daemon.statuses().await)
}

pub async fn get_mount(
    State(daemon): State<VolumeDaemon>,
    Path(name): Path<String>,
) -> (StatusCode, Json<serde_json::Value>) {
    let Some(slot) = daemon.proxy(&name).await else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "msg": format!("mount group {name} not found") })),
        );
    };
    match serde_json::to_value(slot.observed().await) {
        Ok(value) => (StatusCode::OK, Json(value)),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "msg": e.to_string() })),
        ),
    }
}

/// 200 when every group is healthy and mounted, 503 listing the others.
pub async fn healthz(State(daemon): State<VolumeDaemon>) -> (StatusCode, Json<serde_json::Value>) {
    let failing: Vec<String> = daemon
        .statuses()
        .await
        .into_iter()
        .filter(|s| !(s.healthy && s.mounted))
        .map(|s| s.name)
        .collect();
    if failing.is_empty() {
        (StatusCode::OK, Json(json!({ "status": "ok" })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "degraded", "failing": failing })),
        )
    }
}
