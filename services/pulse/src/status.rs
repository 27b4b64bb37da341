//! Status API: read-only JSON views of endpoint state, alerts and delivery

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

use crate::delivery::DeliveryStats;
use crate::log_store::{group_by_url, LogSink};
use crate::state::StateHandle;
use crate::PulseError;

/// Status API application state
#[derive(Clone)]
pub struct StatusState {
    pub state: StateHandle,
    pub stats: Arc<DeliveryStats>,
    pub log_sink: Arc<dyn LogSink>,
}

/// Build the status API router
pub fn build_router(status: StatusState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET]);

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/status", get(status_handler))
        .route("/api/alerts", get(alerts_handler))
        .route("/api/delivery", get(delivery_handler))
        .route("/api/monitoring-data", get(monitoring_data_handler))
        .layer(cors)
        .with_state(status)
}

/// Serve the status API on `port` until `cancel` fires
pub async fn serve(status: StatusState, port: u16, cancel: CancellationToken) -> crate::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| PulseError::Status(format!("Failed to bind port {}: {}", port, e)))?;
    tracing::info!("Status API listening on http://{}", addr);

    axum::serve(listener, build_router(status))
        .with_graceful_shutdown(async move {
            cancel.cancelled().await;
        })
        .await
        .map_err(|e| PulseError::Status(e.to_string()))?;

    tracing::debug!("Status API stopped");
    Ok(())
}

async fn health_handler() -> impl IntoResponse {
    "OK"
}

async fn status_handler(State(status): State<StatusState>) -> impl IntoResponse {
    let state = status.state.read().await;
    Json(json!({
        "uptime_seconds": state.started_at.elapsed().as_secs(),
        "endpoints": state.endpoints,
    }))
}

async fn alerts_handler(State(status): State<StatusState>) -> impl IntoResponse {
    let state = status.state.read().await;
    Json(state.history.iter().cloned().collect::<Vec<_>>())
}

async fn delivery_handler(State(status): State<StatusState>) -> impl IntoResponse {
    Json(status.stats.snapshot())
}

async fn monitoring_data_handler(State(status): State<StatusState>) -> impl IntoResponse {
    match status.log_sink.fetch_all().await {
        Ok(records) => Json(group_by_url(records)).into_response(),
        Err(e) => {
            tracing::warn!("Failed to read monitoring history: {}", e);
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}
