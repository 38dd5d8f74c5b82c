//! GET /health

use axum::Json;
use axum::extract::State;
use std::sync::Arc;

use crate::types::HealthResponse;

/// Health check — returns OK + the active session backend.
pub async fn health(State(state): State<Arc<crate::AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        backend: state.session_layer.interface.kind().into(),
    })
}
