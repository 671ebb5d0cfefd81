//! REST surface for the profiler. Thin forwarding layer over
//! [`FlameGraphService`]; no profiling logic lives here.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::export::health::HealthMetrics;
use crate::service::FlameGraphService;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<FlameGraphService>,
    pub health: Arc<HealthMetrics>,
}

#[derive(Serialize)]
struct StatusResponse {
    sampling: bool,
}

/// Builds the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/flamegraph", get(dump))
        .route("/api/v1/flamegraph/reset", post(reset))
        .route("/api/v1/flamegraph/start", post(start))
        .route("/api/v1/flamegraph/stop", post(stop))
        .route("/api/v1/flamegraph/status", get(status))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Serves the API until the cancellation token fires.
pub async fn serve(addr: String, state: AppState, cancel: CancellationToken) -> Result<()> {
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding http listener on {addr}"))?;

    info!(addr = %addr, "http api listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .context("serving http api")
}

async fn dump(State(state): State<AppState>) -> String {
    state.service.dump_folded()
}

async fn reset(State(state): State<AppState>) -> &'static str {
    state.service.reset();
    "ok"
}

async fn start(State(state): State<AppState>) -> &'static str {
    state.service.start_sampling();
    "started"
}

async fn stop(State(state): State<AppState>) -> &'static str {
    state.service.stop_sampling();
    "stopped"
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        sampling: state.service.is_sampling(),
    })
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match state.health.encode() {
        Ok(body) => (StatusCode::OK, body).into_response(),
        Err(e) => {
            error!(error = %e, "metrics encoding failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
