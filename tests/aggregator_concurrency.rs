use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use method_telemetry::{
    BufferedTraceStore, ManualClock, MethodTrace, MetricField, MetricsAggregator, Payload,
};

const T0: i64 = 1_700_000_040_000;

fn calls_in(payload: &Payload, method: &str) -> u64 {
    payload
        .method_metrics
        .iter()
        .filter_map(|b| b.methods.get(method))
        .map(|m| m.count)
        .sum()
}

#[test]
fn every_call_lands_in_exactly_one_payload() {
    const WRITERS: usize = 8;
    const CALLS_PER_WRITER: usize = 2_000;

    let clock = Arc::new(ManualClock::new(T0));
    let store = Arc::new(BufferedTraceStore::new(16));
    let agg = Arc::new(MetricsAggregator::new(clock, store));
    let writers_done = Arc::new(AtomicBool::new(false));

    let drainer = {
        let agg = agg.clone();
        let writers_done = writers_done.clone();
        thread::spawn(move || {
            let mut payloads = Vec::new();
            while !writers_done.load(Ordering::SeqCst) {
                payloads.push(agg.build_payload());
                thread::yield_now();
            }
            payloads
        })
    };

    let writers: Vec<_> = (0..WRITERS)
        .map(|w| {
            let agg = agg.clone();
            thread::spawn(move || {
                for i in 0..CALLS_PER_WRITER {
                    // spread over three minutes
                    let at = T0 + ((w * CALLS_PER_WRITER + i) % 3) as i64 * 60_000;
                    agg.process_method(
                        MethodTrace::new("hot.method", at).with_metric(MetricField::Db, 1.0),
                    );
                }
            })
        })
        .collect();

    for w in writers {
        w.join().unwrap();
    }
    writers_done.store(true, Ordering::SeqCst);

    let mut payloads = drainer.join().unwrap();
    payloads.push(agg.build_payload());

    let total: u64 = payloads.iter().map(|p| calls_in(p, "hot.method")).sum();
    assert_eq!(total, (WRITERS * CALLS_PER_WRITER) as u64);
    assert_eq!(agg.pending_buckets(), 0);
}

fn db_time_in(payload: &Payload, method: &str) -> f64 {
    payload
        .method_metrics
        .iter()
        .filter_map(|b| b.methods.get(method))
        .map(|m| m.db * m.count as f64)
        .sum()
}

#[test]
fn merges_race_with_drain_without_loss() {
    let clock = Arc::new(ManualClock::new(T0));
    let store = Arc::new(BufferedTraceStore::new(16));
    let agg = Arc::new(MetricsAggregator::new(clock, store));

    let writer = {
        let agg = agg.clone();
        thread::spawn(move || {
            for i in 0..5_000 {
                agg.process_method(
                    MethodTrace::new("A", T0 + (i % 60) * 1_000).with_metric(MetricField::Db, 3.0),
                );
            }
        })
    };

    // averages times count restores each drained sum
    let mut db = 0.0;
    while !writer.is_finished() {
        db += db_time_in(&agg.build_payload(), "A");
    }
    writer.join().unwrap();
    db += db_time_in(&agg.build_payload(), "A");

    assert_eq!(db, 15_000.0);
}

#[test]
fn size_only_methods_report_zero_sizes() {
    let clock = Arc::new(ManualClock::new(T0));
    let store = Arc::new(BufferedTraceStore::new(16));
    let agg = MetricsAggregator::new(clock, store);

    agg.track_doc_size("A", 3_000);
    agg.track_msg_size("A", 400);

    let payload = agg.build_payload();
    let a = &payload.method_metrics[0].methods["A"];
    assert_eq!(a.count, 0);
    assert_eq!(a.fetched_doc_size, 0.0);
    assert_eq!(a.sent_msg_size, 0.0);
    assert_eq!(agg.pending_buckets(), 0);
}
