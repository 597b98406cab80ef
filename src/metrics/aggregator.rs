use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use super::payload::{BucketSummary, Payload};
use super::tracer_store::TraceStore;
use super::{date_id, MethodTrace, MetricField, MINUTE_MS};
use crate::clock::Clock;

// ─── Public types ────────────────────────────────────────────────

/// Running totals for one method inside one minute.
///
/// Field sums only ever receive strictly positive contributions; `count` is
/// the number of merged traces, which can stay at zero when a method only
/// reported size events.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MethodMetrics {
    pub count: u64,
    pub errors: u64,
    pub fetched_doc_size: u64,
    pub sent_msg_size: u64,
    pub wait: f64,
    pub db: f64,
    pub http: f64,
    pub email: f64,
    pub r#async: f64,
    pub compute: f64,
    pub total: f64,
}

impl MethodMetrics {
    pub fn field(&self, field: MetricField) -> f64 {
        match field {
            MetricField::Wait => self.wait,
            MetricField::Db => self.db,
            MetricField::Http => self.http,
            MetricField::Email => self.email,
            MetricField::Async => self.r#async,
            MetricField::Compute => self.compute,
            MetricField::Total => self.total,
        }
    }

    fn field_mut(&mut self, field: MetricField) -> &mut f64 {
        match field {
            MetricField::Wait => &mut self.wait,
            MetricField::Db => &mut self.db,
            MetricField::Http => &mut self.http,
            MetricField::Email => &mut self.email,
            MetricField::Async => &mut self.r#async,
            MetricField::Compute => &mut self.compute,
            MetricField::Total => &mut self.total,
        }
    }

    /// Fold one trace in. Non-positive values are dropped as noise.
    fn merge(&mut self, trace: &MethodTrace) {
        for field in MetricField::ALL {
            match trace.metric(field) {
                Some(value) if value > 0.0 => *self.field_mut(field) += value,
                _ => {}
            }
        }
        self.count += 1;
        if trace.errored {
            self.errors += 1;
        }
    }
}

/// Everything recorded for one minute of wall-clock time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MinuteBucket {
    pub date_id: i64,
    /// Timestamp of the first merged trace
    pub start_time: Option<i64>,
    /// Timestamp of the latest merged trace
    pub end_time: Option<i64>,
    pub methods: HashMap<String, MethodMetrics>,
}

impl MinuteBucket {
    fn new(date_id: i64) -> Self {
        Self {
            date_id,
            ..Self::default()
        }
    }

    /// Start of the minute this bucket covers.
    pub fn window_start(&self) -> i64 {
        self.date_id * MINUTE_MS
    }

    fn method(&mut self, name: &str) -> &mut MethodMetrics {
        self.methods.entry(name.to_owned()).or_default()
    }

    fn record_trace(&mut self, trace: &MethodTrace) {
        self.method(&trace.name).merge(trace);
        self.start_time.get_or_insert(trace.at);
        // late traces never pull the end back
        self.end_time = Some(self.end_time.map_or(trace.at, |end| end.max(trace.at)));
    }
}

/// Thread-safe per-minute method metrics.
/// Call sites merge traces and size events; the flush timer calls
/// `build_payload()` to drain everything recorded so far.
pub struct MetricsAggregator {
    buckets: Mutex<BTreeMap<i64, MinuteBucket>>,
    clock: Arc<dyn Clock>,
    traces: Arc<dyn TraceStore>,
}

// ─── MetricsAggregator impl ──────────────────────────────────────

impl MetricsAggregator {
    pub fn new(clock: Arc<dyn Clock>, traces: Arc<dyn TraceStore>) -> Self {
        Self {
            buckets: Mutex::new(BTreeMap::new()),
            clock,
            traces,
        }
    }

    /// Merge a completed call into its minute, then hand the trace to the
    /// trace store.
    pub fn process_method(&self, trace: MethodTrace) {
        let id = date_id(trace.at);
        self.buckets
            .lock()
            .entry(id)
            .or_insert_with(|| MinuteBucket::new(id))
            .record_trace(&trace);

        self.traces.add_trace(trace);
    }

    /// Add bytes of documents fetched by `method` to the current minute.
    pub fn track_doc_size(&self, method: &str, size: u64) {
        self.with_current_method(method, |m| m.fetched_doc_size += size);
    }

    /// Add bytes of messages sent by `method` to the current minute.
    pub fn track_msg_size(&self, method: &str, size: u64) {
        self.with_current_method(method, |m| m.sent_msg_size += size);
    }

    fn with_current_method<F>(&self, method: &str, update: F)
    where
        F: FnOnce(&mut MethodMetrics),
    {
        let id = date_id(self.clock.now_ms());
        let mut buckets = self.buckets.lock();
        let bucket = buckets.entry(id).or_insert_with(|| MinuteBucket::new(id));
        update(bucket.method(method));
    }

    /// Number of minutes recorded since the last drain.
    pub fn pending_buckets(&self) -> usize {
        self.buckets.lock().len()
    }

    /// Copy of one live bucket, for inspection.
    pub fn bucket(&self, date_id: i64) -> Option<MinuteBucket> {
        self.buckets.lock().get(&date_id).cloned()
    }

    /// Drain every recorded minute and the buffered traces into a payload.
    ///
    /// The live map is swapped for an empty one under the lock; writes that
    /// race with the drain land in the new map and ship with the next
    /// payload. The detached map is finalized without holding the lock.
    pub fn build_payload(&self) -> Payload {
        let drained = std::mem::take(&mut *self.buckets.lock());

        let method_metrics: Vec<BucketSummary> = drained
            .into_values()
            .map(|bucket| BucketSummary::finalize(bucket, self.clock.as_ref()))
            .collect();
        let method_requests = self.traces.collect_traces();

        if method_metrics.is_empty() && method_requests.is_empty() {
            debug!("payload drain found nothing to send");
        } else {
            info!(
                buckets = method_metrics.len(),
                traces = method_requests.len(),
                "drained method metrics payload"
            );
        }

        Payload {
            method_metrics,
            method_requests,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::metrics::tracer_store::BufferedTraceStore;

    const T0: i64 = 1_700_000_040_000; // 20 s into a minute

    fn aggregator() -> (MetricsAggregator, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(T0));
        let store = Arc::new(BufferedTraceStore::new(100));
        (MetricsAggregator::new(clock.clone(), store), clock)
    }

    fn method_in(agg: &MetricsAggregator, at: i64, name: &str) -> MethodMetrics {
        agg.bucket(date_id(at))
            .and_then(|b| b.methods.get(name).cloned())
            .unwrap()
    }

    #[test]
    fn repeated_calls_accumulate() {
        let (agg, _) = aggregator();
        for _ in 0..2 {
            agg.process_method(
                MethodTrace::new("posts.fetch", T0).with_metric(MetricField::Db, 50.0),
            );
        }
        let m = method_in(&agg, T0, "posts.fetch");
        assert_eq!(m.db, 100.0);
        assert_eq!(m.count, 2);
        assert_eq!(m.errors, 0);
    }

    #[test]
    fn non_positive_values_are_dropped() {
        let (agg, _) = aggregator();
        agg.process_method(
            MethodTrace::new("m", T0)
                .with_metric(MetricField::Wait, -4.0)
                .with_metric(MetricField::Http, 0.0)
                .with_metric(MetricField::Total, 7.5),
        );
        let m = method_in(&agg, T0, "m");
        assert_eq!(m.wait, 0.0);
        assert_eq!(m.http, 0.0);
        assert_eq!(m.total, 7.5);
        assert_eq!(m.count, 1);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let (agg, _) = aggregator();
        let mut trace = MethodTrace::new("m", T0).with_metric(MetricField::Compute, 3.0);
        trace.metrics.insert("gc".into(), 99.0);
        agg.process_method(trace);
        let m = method_in(&agg, T0, "m");
        assert_eq!(m.compute, 3.0);
        let others: f64 = MetricField::ALL
            .iter()
            .filter(|f| **f != MetricField::Compute)
            .map(|f| m.field(*f))
            .sum();
        assert_eq!(others, 0.0);
    }

    #[test]
    fn errored_trace_counts_once() {
        let (agg, _) = aggregator();
        agg.process_method(MethodTrace::new("m", T0).with_error());
        agg.process_method(MethodTrace::new("m", T0 + 1));
        let m = method_in(&agg, T0, "m");
        assert_eq!(m.errors, 1);
        assert_eq!(m.count, 2);
    }

    #[test]
    fn bucket_tracks_first_and_latest_timestamps() {
        let (agg, _) = aggregator();
        agg.process_method(MethodTrace::new("a", T0 + 5_000));
        agg.process_method(MethodTrace::new("b", T0 + 1_000));
        agg.process_method(MethodTrace::new("a", T0 + 9_000));
        let bucket = agg.bucket(date_id(T0)).unwrap();
        assert_eq!(bucket.start_time, Some(T0 + 5_000));
        assert_eq!(bucket.end_time, Some(T0 + 9_000));
    }

    #[test]
    fn out_of_order_trace_keeps_latest_end_time() {
        let (agg, _) = aggregator();
        agg.process_method(MethodTrace::new("a", T0 + 9_000));
        agg.process_method(MethodTrace::new("a", T0 + 1_000));
        let bucket = agg.bucket(date_id(T0)).unwrap();
        assert_eq!(bucket.start_time, Some(T0 + 9_000));
        assert_eq!(bucket.end_time, Some(T0 + 9_000));
    }

    #[test]
    fn traces_split_across_minutes() {
        let (agg, _) = aggregator();
        agg.process_method(MethodTrace::new("m", T0));
        agg.process_method(MethodTrace::new("m", T0 + MINUTE_MS));
        assert_eq!(agg.pending_buckets(), 2);
        assert_eq!(method_in(&agg, T0, "m").count, 1);
        assert_eq!(method_in(&agg, T0 + MINUTE_MS, "m").count, 1);
    }

    #[test]
    fn size_events_need_no_trace() {
        let (agg, _) = aggregator();
        agg.track_doc_size("A", 1000);
        agg.track_doc_size("A", 500);
        agg.track_msg_size("A", 64);
        let m = method_in(&agg, T0, "A");
        assert_eq!(m.fetched_doc_size, 1500);
        assert_eq!(m.sent_msg_size, 64);
        assert_eq!(m.count, 0);
        assert_eq!(agg.bucket(date_id(T0)).unwrap().start_time, None);
    }

    #[test]
    fn size_events_follow_the_clock() {
        let (agg, clock) = aggregator();
        agg.track_msg_size("A", 10);
        clock.advance(MINUTE_MS);
        agg.track_msg_size("A", 20);
        assert_eq!(method_in(&agg, T0, "A").sent_msg_size, 10);
        assert_eq!(method_in(&agg, T0 + MINUTE_MS, "A").sent_msg_size, 20);
    }

    #[test]
    fn build_payload_empties_live_map() {
        let (agg, _) = aggregator();
        agg.process_method(MethodTrace::new("m", T0));
        let first = agg.build_payload();
        assert_eq!(first.method_metrics.len(), 1);
        assert_eq!(agg.pending_buckets(), 0);

        let second = agg.build_payload();
        assert!(second.method_metrics.is_empty());
        assert!(second.method_requests.is_empty());
    }
}
