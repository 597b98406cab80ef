use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct EstimateRequest {
    pub collection: String,
    #[serde(default)]
    pub query: Value,
    #[serde(default)]
    pub options: Value,
    /// Result set to estimate; `null`, `[]` and `{}` all count as empty
    #[serde(default)]
    pub rows: Value,
}

#[derive(Debug, Serialize)]
pub struct EstimateResponse {
    pub estimated_bytes: f64,
}

// ─── POST /api/estimate ──────────────────────────────────────────

pub async fn estimate_size(
    State(state): State<Arc<AppState>>,
    Json(req): Json<EstimateRequest>,
) -> Json<EstimateResponse> {
    let estimated_bytes = state.size_cache.get_size(
        req.collection.as_str(),
        &req.query,
        &req.options,
        Some(&req.rows),
    );

    Json(EstimateResponse { estimated_bytes })
}
