use method_telemetry::{Clock, MethodTrace, MetricField};
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use serde_json::{json, Value};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::AppState;

/// Synthetic methods: (name, collection, typical db time in ms)
const METHODS: &[(&str, &str, f64)] = &[
    ("posts.list", "posts", 12.0),
    ("posts.get", "posts", 3.0),
    ("users.profile", "users", 5.0),
    ("comments.add", "comments", 8.0),
    ("search.run", "documents", 40.0),
];

// ─── Public entry points ─────────────────────────────────────────

/// Flip `load_running` and spawn the generator. Returns `false` if it was
/// already running.
pub async fn start(state: &Arc<AppState>) -> bool {
    if state
        .load_running
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return false;
    }

    let handle = tokio::spawn(run(state.clone()));
    *state.load_handle.lock().await = Some(handle);
    info!(workers = state.config.load_concurrency, "load generator started");
    true
}

/// Clear `load_running` and wait for every worker to exit. Returns `false`
/// if nothing was running.
pub async fn stop(state: &AppState) -> bool {
    if !state.load_running.swap(false, Ordering::SeqCst) {
        return false;
    }

    let handle = state.load_handle.lock().await.take();
    if let Some(handle) = handle {
        if let Err(e) = handle.await {
            warn!(error = %e, "load generator task failed");
        }
    }
    info!("load generator stopped");
    true
}

/// Runs `load_concurrency` Tokio tasks that play the part of instrumented
/// application code until `load_running` is cleared.
async fn run(state: Arc<AppState>) {
    let mut handles = Vec::with_capacity(state.config.load_concurrency as usize);
    for worker_id in 0..state.config.load_concurrency {
        let state = state.clone();
        handles.push(tokio::spawn(async move {
            worker(worker_id, state).await;
        }));
    }

    for (worker_id, h) in handles.into_iter().enumerate() {
        if let Err(e) = h.await {
            warn!(worker_id, error = %e, "load worker failed");
        }
    }
}

// ─── Worker loop ─────────────────────────────────────────────────

async fn worker(id: u32, state: Arc<AppState>) {
    // Each worker gets its own deterministic RNG seeded uniquely.
    let mut rng = StdRng::seed_from_u64(1000 + id as u64);

    while state.load_running.load(Ordering::Relaxed) {
        simulate_call(&mut rng, &state);
        let pause = rng.gen_range(5..50u64);
        tokio::time::sleep(Duration::from_millis(pause)).await;
    }
}

// ─── One instrumented call ───────────────────────────────────────

fn simulate_call(rng: &mut StdRng, state: &AppState) {
    let (name, collection, db_base) = METHODS[rng.gen_range(0..METHODS.len())];

    // ── Query + size estimate ───────────────────────────────────
    let query = json!({ "owner": format!("usr_{:04}", rng.gen_range(1..=50u32)) });
    let options = json!({ "limit": 20, "sort": { "createdAt": -1 } });
    let rows = fake_rows(rng, collection);

    let estimate = state
        .size_cache
        .get_size(collection, &query, &options, Some(&rows));
    let fetched = (estimate * rows.len() as f64).round() as u64;
    state.aggregator.track_doc_size(name, fetched);

    // ── Timing breakdown ────────────────────────────────────────
    let wait = rng.gen_range(0.0..2.0);
    let db = db_base * rng.gen_range(0.5..2.0);
    let compute = rng.gen_range(0.2..6.0);
    let total = wait + db + compute;

    let mut trace = MethodTrace::new(name, state.clock.now_ms())
        .with_metric(MetricField::Wait, wait)
        .with_metric(MetricField::Db, db)
        .with_metric(MetricField::Compute, compute)
        .with_metric(MetricField::Total, total);
    if rng.gen_bool(0.02) {
        trace = trace.with_error();
    }
    state.aggregator.process_method(trace);

    state
        .aggregator
        .track_msg_size(name, rng.gen_range(64..4_096u64));
}

fn fake_rows(rng: &mut StdRng, collection: &str) -> Vec<Value> {
    let count = rng.gen_range(0..20usize);
    (0..count)
        .map(|i| {
            json!({
                "_id":        format!("{collection}_{:08x}", rng.gen::<u32>()),
                "index":      i,
                "body":       "x".repeat(rng.gen_range(16..512usize)),
                "tags":       ["alpha", "beta"],
                "created_at": "2025-06-19T00:00:00Z",
            })
        })
        .collect()
}
