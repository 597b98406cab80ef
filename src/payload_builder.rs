use std::sync::Arc;
use std::time::Duration;

use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;
use tracing::{debug, info};

use crate::AppState;

/// Drain the aggregator once per `period` for as long as the process runs.
///
/// Upload is out of scope here: the payload is logged and kept as the
/// latest payload for the inspection endpoint.
pub async fn run(state: Arc<AppState>, period: Duration) {
    // First tick one full period from now, not immediately
    let interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    let mut ticks = IntervalStream::new(interval);

    while ticks.next().await.is_some() {
        let payload = state.flush();
        if payload.is_empty() {
            debug!("nothing to ship this interval");
            continue;
        }

        let bytes = serde_json::to_vec(&payload).map(|b| b.len()).unwrap_or(0);
        info!(
            buckets = payload.method_metrics.len(),
            traces = payload.method_requests.len(),
            bytes,
            "payload ready"
        );
    }
}
