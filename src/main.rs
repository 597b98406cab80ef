use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use method_telemetry::{
    AgentConfig, BufferedTraceStore, CpuGauge, MetricsAggregator, Payload, SizeEstimateCache,
    SyncedClock,
};
use parking_lot::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod handlers;
mod load_generator;
mod middleware;
mod payload_builder;
mod server;

/// Environment variable naming an optional JSON config file.
const CONFIG_ENV: &str = "TELEMETRY_AGENT_CONFIG";

/// Shared agent state available to every handler via `State<Arc<AppState>>`.
pub struct AppState {
    pub config: AgentConfig,

    /// Minute-bucketed method metrics. Call sites merge, the flush loop drains.
    pub aggregator: Arc<MetricsAggregator>,

    /// Result-size estimator shared by every query call site.
    pub size_cache: Arc<SizeEstimateCache>,

    /// CPU reading fed to the size cache's refresh score.
    pub cpu: CpuGauge,

    /// Sampled traces waiting for the next payload.
    pub traces: Arc<BufferedTraceStore>,

    pub clock: Arc<SyncedClock>,

    /// Most recent non-empty payload, kept for inspection.
    pub latest_payload: Mutex<Option<Payload>>,

    /// Flag checked by every load-generator worker on each iteration.
    pub load_running: Arc<AtomicBool>,

    /// Handle to the spawned load-generator task so `stop` can await it.
    pub load_handle: tokio::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl AppState {
    pub fn new(config: AgentConfig) -> Self {
        let clock = Arc::new(SyncedClock::new());
        let traces = Arc::new(BufferedTraceStore::from_config(&config));
        let cpu = CpuGauge::new();

        Self {
            aggregator: Arc::new(MetricsAggregator::new(clock.clone(), traces.clone())),
            size_cache: Arc::new(SizeEstimateCache::from_config(
                &config,
                cpu.clone(),
                clock.clone(),
            )),
            cpu,
            traces,
            clock,
            latest_payload: Mutex::new(None),
            load_running: Arc::new(AtomicBool::new(false)),
            load_handle: tokio::sync::Mutex::new(None),
            config,
        }
    }

    /// Drain the aggregator now. Non-empty payloads replace the stored one.
    pub fn flush(&self) -> Payload {
        let payload = self.aggregator.build_payload();
        if !payload.is_empty() {
            *self.latest_payload.lock() = Some(payload.clone());
        }
        payload
    }
}

fn load_config() -> AgentConfig {
    let Ok(path) = std::env::var(CONFIG_ENV) else {
        return AgentConfig::default();
    };

    AgentConfig::from_file(&path).unwrap_or_else(|e| {
        eprintln!("❌ Cannot load config from \"{path}\": {e}");
        std::process::exit(1);
    })
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── 1. Configuration ─────────────────────────────────────────
    let config = load_config();
    info!(?config, "starting telemetry agent");

    // ── 2. Build shared state ────────────────────────────────────
    let state = Arc::new(AppState::new(config));

    // ── 3. Periodic payload drain ────────────────────────────────
    let interval = Duration::from_millis(state.config.flush_interval_ms);
    tokio::spawn(payload_builder::run(state.clone(), interval));

    // ── 4. Synthetic traffic ─────────────────────────────────────
    if state.config.load_enabled {
        load_generator::start(&state).await;
    }

    // ── 5. Build Axum router ─────────────────────────────────────
    let app = server::create_router(state.clone());

    // ── 6. Bind & serve ──────────────────────────────────────────
    let addr = state.config.listen_addr.clone();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            eprintln!("❌ Failed to bind to {addr}: {e}");
            std::process::exit(1);
        });

    info!(%addr, "inspection server listening");
    info!("status         → GET  /api/status");
    info!("latest payload → GET  /api/payload/latest");
    info!("force a drain  → POST /api/flush");
    info!("load on / off  → POST /api/load/start | /api/load/stop");

    axum::serve(listener, app)
        .await
        .expect("Server exited with error");
}
