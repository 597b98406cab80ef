use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::AppState;

use super::AppError;

// ─── Request / response types ────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct AgentStatus {
    /// Minutes recorded since the last drain
    pub pending_buckets: usize,
    /// Query signatures tracked by the size cache
    pub size_cache_entries: usize,
    pub buffered_traces: usize,
    pub dropped_traces: u64,
    pub pcpu: f64,
    pub clock_offset_ms: i64,
    pub load_running: bool,
}

#[derive(Debug, Deserialize)]
pub struct CpuReading {
    /// Process CPU utilization in percent
    pub pcpu: f64,
}

// ─── GET /api/status ─────────────────────────────────────────────

pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<AgentStatus> {
    Json(AgentStatus {
        pending_buckets: state.aggregator.pending_buckets(),
        size_cache_entries: state.size_cache.len(),
        buffered_traces: state.traces.len(),
        dropped_traces: state.traces.dropped(),
        pcpu: state.cpu.get(),
        clock_offset_ms: state.clock.offset(),
        load_running: state.load_running.load(Ordering::SeqCst),
    })
}

// ─── POST /api/cpu ───────────────────────────────────────────────

/// Hook for an external CPU sampler.
pub async fn set_cpu(
    State(state): State<Arc<AppState>>,
    Json(reading): Json<CpuReading>,
) -> Result<Json<AgentStatus>, AppError> {
    if !reading.pcpu.is_finite() || reading.pcpu < 0.0 {
        return Err(AppError::BadRequest(
            "pcpu must be a non-negative number".into(),
        ));
    }

    state.size_cache.set_pcpu(reading.pcpu);
    Ok(get_status(State(state)).await)
}
