//! Health check endpoints.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
};
use quad_common::DisclosureMode;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Basic health check (is the server running?)
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
pub struct ReadyResponse {
    status: &'static str,
    store: &'static str,
}

/// Readiness check (is the challenge store reachable?)
pub async fn ready_check(
    State(state): State<AppState>,
) -> Result<Json<ReadyResponse>, StatusCode> {
    let store = state.store();

    match store.ping().await {
        Ok(()) => Ok(Json(ReadyResponse {
            status: "ready",
            store: store.backend(),
        })),
        Err(e) => {
            tracing::warn!(error = %e, "Challenge store not ready");
            // Return 503 if not ready
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}

#[derive(Serialize)]
pub struct MetricsResponse {
    pending_challenges: usize,
    known_identities: usize,
    store: &'static str,
    disclosure: DisclosureMode,
}

/// Metrics endpoint (for monitoring)
pub async fn metrics(
    State(state): State<AppState>,
) -> Result<Json<MetricsResponse>, StatusCode> {
    let pending_challenges = state
        .otp
        .pending_count()
        .await
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;

    Ok(Json(MetricsResponse {
        pending_challenges,
        known_identities: state.sessions.identity_count(),
        store: state.store().backend(),
        disclosure: state.otp.settings().disclosure,
    }))
}
