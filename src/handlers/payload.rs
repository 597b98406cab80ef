use axum::{extract::State, Json};
use method_telemetry::Payload;
use std::sync::Arc;

use crate::AppState;

use super::AppError;

// ─── GET /api/payload/latest ─────────────────────────────────────

/// The last non-empty payload the flush loop produced.
pub async fn latest_payload(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Payload>, AppError> {
    state
        .latest_payload
        .lock()
        .clone()
        .map(Json)
        .ok_or_else(|| AppError::NotFound("No payload drained yet".into()))
}

// ─── POST /api/flush ─────────────────────────────────────────────

/// Drain immediately instead of waiting for the next tick.
pub async fn flush(State(state): State<Arc<AppState>>) -> Json<Payload> {
    Json(state.flush())
}
