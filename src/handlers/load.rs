use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::load_generator;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct LoadStatus {
    pub running: bool,
    pub message: String,
}

// ─── POST /api/load/start ────────────────────────────────────────

pub async fn start_load(State(state): State<Arc<AppState>>) -> Json<LoadStatus> {
    let message = if load_generator::start(&state).await {
        format!("Started {} workers", state.config.load_concurrency)
    } else {
        "Load generator already running".into()
    };

    Json(LoadStatus {
        running: true,
        message,
    })
}

// ─── POST /api/load/stop ─────────────────────────────────────────

pub async fn stop_load(State(state): State<Arc<AppState>>) -> Json<LoadStatus> {
    let message = if load_generator::stop(&state).await {
        "Load generator stopped"
    } else {
        "Load generator is not running"
    };

    Json(LoadStatus {
        running: false,
        message: message.into(),
    })
}
