use axum::{
    middleware as axum_mw,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::handlers;
use crate::middleware::timing;
use crate::AppState;

/// Builds the inspection `Router`. Every route is itself instrumented, so
/// hitting the API shows up in the next payload.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // ── Agent state ─────────────────────────────────────────
        .route("/api/status", get(handlers::status::get_status))
        .route("/api/cpu", post(handlers::status::set_cpu))
        // ── Size estimation ─────────────────────────────────────
        .route("/api/estimate", post(handlers::estimate::estimate_size))
        // ── Payloads ────────────────────────────────────────────
        .route(
            "/api/payload/latest",
            get(handlers::payload::latest_payload),
        )
        .route("/api/flush", post(handlers::payload::flush))
        // ── Synthetic load ──────────────────────────────────────
        .route("/api/load/start", post(handlers::load::start_load))
        .route("/api/load/stop", post(handlers::load::stop_load))
        // ── Global middleware (applied bottom-up) ───────────────
        .layer(axum_mw::from_fn_with_state(
            state.clone(),
            timing::timing_middleware,
        ))
        .layer(CorsLayer::permissive())
        // ── Provide shared state to all routes above ────────────
        .with_state(state)
}
