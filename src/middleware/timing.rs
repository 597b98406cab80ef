use axum::{
    extract::{MatchedPath, Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use method_telemetry::{Clock, MethodTrace, MetricField};
use std::sync::Arc;
use std::time::Instant;

use crate::AppState;

/// Records every request as a method trace named `"<METHOD> <route>"`,
/// plus the response size when the body length is known up front.
///
/// Also prints a coloured one-liner to stdout for development.
pub async fn timing_middleware(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let method = req.method().clone();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| req.uri().path().to_owned());
    let name = format!("{method} {route}");

    let at = state.clock.now_ms();
    let start = Instant::now();
    let response = next.run(req).await;
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

    // ── Feed the aggregator ─────────────────────────────────────
    let status = response.status().as_u16();
    let mut trace = MethodTrace::new(name.clone(), at)
        .with_metric(MetricField::Compute, elapsed_ms)
        .with_metric(MetricField::Total, elapsed_ms);
    if status >= 500 {
        trace = trace.with_error();
    }
    state.aggregator.process_method(trace);

    let body_len = response
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    if let Some(len) = body_len {
        state.aggregator.track_msg_size(&name, len);
    }

    // ── Console log ─────────────────────────────────────────────
    let colour = match status {
        200..=299 => "\x1b[32m", // green
        400..=499 => "\x1b[33m", // yellow
        _ => "\x1b[31m",        // red
    };
    println!("  {colour}{status}\x1b[0m  {method:<5} {route:<25} {elapsed_ms:>9.3}ms");

    response
}
