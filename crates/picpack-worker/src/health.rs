//! Health/status surface.
//!
//! Operational visibility only: `/healthz` answers liveness at constant
//! cost, `/status` reports the busy/idle state, uptime and the number of
//! jobs processed. Served on its own port alongside the worker loop.

use anyhow::Result;
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::supervisor::IdleShutdown;

#[derive(Serialize)]
struct StatusResponse {
    state: &'static str,
    uptime_seconds: u64,
    jobs_processed: u64,
}

pub fn router(supervisor: IdleShutdown) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/status", get(status))
        .with_state(supervisor)
}

/// Liveness probe - process is running.
async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "alive" }))
}

async fn status(State(supervisor): State<IdleShutdown>) -> Json<StatusResponse> {
    let snapshot = supervisor.snapshot();
    Json(StatusResponse {
        state: if snapshot.busy { "busy" } else { "idle" },
        uptime_seconds: snapshot.uptime.as_secs(),
        jobs_processed: snapshot.jobs_processed,
    })
}

/// Bind and serve the health endpoints.
pub async fn serve(supervisor: IdleShutdown, port: u16) -> Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "Health endpoint listening");
    axum::serve(listener, router(supervisor)).await?;
    Ok(())
}
