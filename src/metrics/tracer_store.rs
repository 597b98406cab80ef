use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::trace;

use super::{date_id, MethodTrace, MetricField};
use crate::config::{default_metrics_threshold, AgentConfig};

/// Receives raw traces from the aggregator and hands a sampled subset back
/// on every payload drain.
pub trait TraceStore: Send + Sync {
    /// Accept a trace. Must return quickly and never fail; the store may
    /// drop the trace.
    fn add_trace(&self, trace: MethodTrace);

    /// Take every retained trace, leaving the store empty.
    fn collect_traces(&self) -> Vec<MethodTrace>;
}

// ─── Sampling policy ─────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SamplingPolicy {
    /// Upper bound on traces buffered between two drains
    pub capacity: usize,
    /// A successful trace over any of these is kept as an outlier
    pub metrics_threshold: HashMap<MetricField, f64>,
    /// Keep one trace per method at least this often (minutes), 0 disables
    pub archive_every_minutes: i64,
}

impl Default for SamplingPolicy {
    fn default() -> Self {
        Self {
            capacity: 500,
            metrics_threshold: default_metrics_threshold(),
            archive_every_minutes: 5,
        }
    }
}

impl SamplingPolicy {
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            capacity: config.trace_buffer_capacity,
            metrics_threshold: config.metrics_threshold.clone(),
            archive_every_minutes: config.archive_every_minutes,
        }
    }

    fn is_outlier(&self, trace: &MethodTrace) -> bool {
        self.metrics_threshold
            .iter()
            .any(|(field, limit)| trace.metric(*field).is_some_and(|v| v > *limit))
    }
}

// ─── BufferedTraceStore ──────────────────────────────────────────

/// Bounded sampling buffer. A trace is kept, in this order of precedence, if
///
/// * it errored,
/// * any metric exceeds its outlier threshold,
/// * its method has not been archived for `archive_every_minutes`,
/// * it is the slowest or the fastest (by `total`) of its method and minute.
///
/// Each trace occupies at most one slot. Once `capacity` traces are
/// buffered, anything that would need a new slot is dropped.
pub struct BufferedTraceStore {
    policy: SamplingPolicy,
    inner: Mutex<Inner>,
}

/// Slots holding the slowest and fastest trace of one method-minute. Both
/// point at the same slot until a second trace arrives.
#[derive(Debug, Clone, Copy)]
struct Extremes {
    max: usize,
    min: usize,
}

#[derive(Default)]
struct Inner {
    traces: Vec<MethodTrace>,
    extremes: HashMap<(String, i64), Extremes>,
    /// method -> minute of its last archive sample; survives drains
    last_archive: HashMap<String, i64>,
    dropped: u64,
}

impl Inner {
    /// Push into a new slot, or count a drop when full.
    fn push(&mut self, capacity: usize, trace: MethodTrace) -> Option<usize> {
        if self.traces.len() >= capacity {
            self.dropped += 1;
            trace!(dropped = self.dropped, "trace buffer full, dropping trace");
            return None;
        }
        self.traces.push(trace);
        Some(self.traces.len() - 1)
    }
}

impl BufferedTraceStore {
    pub fn new(capacity: usize) -> Self {
        Self::with_policy(SamplingPolicy {
            capacity,
            ..SamplingPolicy::default()
        })
    }

    pub fn with_policy(mut policy: SamplingPolicy) -> Self {
        policy.capacity = policy.capacity.max(1);
        Self {
            policy,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn from_config(config: &AgentConfig) -> Self {
        Self::with_policy(SamplingPolicy::from_config(config))
    }

    pub fn len(&self) -> usize {
        self.inner.lock().traces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().traces.is_empty()
    }

    /// Traces dropped for lack of space since the store was created.
    pub fn dropped(&self) -> u64 {
        self.inner.lock().dropped
    }

    fn archive_due(&self, inner: &Inner, trace: &MethodTrace) -> bool {
        let every = self.policy.archive_every_minutes;
        if every <= 0 {
            return false;
        }
        match inner.last_archive.get(&trace.name) {
            Some(last) => date_id(trace.at) - last >= every,
            None => true,
        }
    }
}

fn total_of(trace: &MethodTrace) -> f64 {
    trace.metric(MetricField::Total).unwrap_or(0.0)
}

impl TraceStore for BufferedTraceStore {
    fn add_trace(&self, incoming: MethodTrace) {
        let capacity = self.policy.capacity;
        let mut inner = self.inner.lock();

        if incoming.errored || self.policy.is_outlier(&incoming) {
            inner.push(capacity, incoming);
            return;
        }

        if self.archive_due(&inner, &incoming) {
            let (name, minute) = (incoming.name.clone(), date_id(incoming.at));
            if inner.push(capacity, incoming).is_some() {
                inner.last_archive.insert(name, minute);
            }
            return;
        }

        let key = (incoming.name.clone(), date_id(incoming.at));
        let total = total_of(&incoming);
        let Some(mut ex) = inner.extremes.get(&key).copied() else {
            if let Some(slot) = inner.push(capacity, incoming) {
                inner.extremes.insert(key, Extremes { max: slot, min: slot });
            }
            return;
        };

        let shared = ex.max == ex.min;
        if total > total_of(&inner.traces[ex.max]) {
            if shared {
                match inner.push(capacity, incoming) {
                    Some(slot) => ex.max = slot,
                    None => return,
                }
            } else {
                inner.traces[ex.max] = incoming;
            }
        } else if total < total_of(&inner.traces[ex.min]) {
            if shared {
                match inner.push(capacity, incoming) {
                    Some(slot) => ex.min = slot,
                    None => return,
                }
            } else {
                inner.traces[ex.min] = incoming;
            }
        } else {
            return;
        }
        inner.extremes.insert(key, ex);
    }

    fn collect_traces(&self) -> Vec<MethodTrace> {
        let mut inner = self.inner.lock();
        inner.extremes.clear();
        std::mem::take(&mut inner.traces)
    }
}
