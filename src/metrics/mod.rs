pub mod aggregator;
pub mod payload;
pub mod tracer_store;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use aggregator::{MethodMetrics, MetricsAggregator, MinuteBucket};
pub use payload::{BucketSummary, MethodAverages, Payload};
pub use tracer_store::{BufferedTraceStore, SamplingPolicy, TraceStore};

/// Width of one aggregation window.
pub const MINUTE_MS: i64 = 60_000;

/// Minute bucket a timestamp falls into.
pub fn date_id(timestamp_ms: i64) -> i64 {
    timestamp_ms.div_euclid(MINUTE_MS)
}

// ─── Tracked metric fields ───────────────────────────────────────

/// Per-call timing breakdown fields that are summed and averaged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricField {
    Wait,
    Db,
    Http,
    Email,
    Async,
    Compute,
    Total,
}

impl MetricField {
    pub const ALL: [MetricField; 7] = [
        MetricField::Wait,
        MetricField::Db,
        MetricField::Http,
        MetricField::Email,
        MetricField::Async,
        MetricField::Compute,
        MetricField::Total,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MetricField::Wait => "wait",
            MetricField::Db => "db",
            MetricField::Http => "http",
            MetricField::Email => "email",
            MetricField::Async => "async",
            MetricField::Compute => "compute",
            MetricField::Total => "total",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == name)
    }
}

// ─── MethodTrace ─────────────────────────────────────────────────

/// One recorded method invocation, as produced by instrumentation.
///
/// `metrics` is keyed by field name; names outside [`MetricField`] are
/// carried along to the trace store but ignored by the aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodTrace {
    #[serde(rename = "_id", default = "Uuid::new_v4")]
    pub id: Uuid,
    pub name: String,
    /// Epoch milliseconds when the call started
    pub at: i64,
    #[serde(default)]
    pub errored: bool,
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
}

impl MethodTrace {
    pub fn new(name: impl Into<String>, at: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            at,
            errored: false,
            metrics: BTreeMap::new(),
        }
    }

    pub fn with_metric(mut self, field: MetricField, value: f64) -> Self {
        self.metrics.insert(field.as_str().to_owned(), value);
        self
    }

    pub fn with_error(mut self) -> Self {
        self.errored = true;
        self
    }

    pub fn metric(&self, field: MetricField) -> Option<f64> {
        self.metrics.get(field.as_str()).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_id_floors_to_minute() {
        assert_eq!(date_id(0), 0);
        assert_eq!(date_id(59_999), 0);
        assert_eq!(date_id(60_000), 1);
        assert_eq!(date_id(1_700_000_123_456), 28_333_335);
        assert_eq!(date_id(-1), -1);
    }

    #[test]
    fn field_names_round_trip() {
        for field in MetricField::ALL {
            assert_eq!(MetricField::from_name(field.as_str()), Some(field));
        }
        assert_eq!(MetricField::from_name("gc"), None);
    }

    #[test]
    fn trace_deserializes_with_defaults() {
        let trace: MethodTrace = serde_json::from_str(
            r#"{"name": "posts.insert", "at": 120000, "metrics": {"db": 12, "gc": 3}}"#,
        )
        .unwrap();
        assert_eq!(trace.name, "posts.insert");
        assert!(!trace.errored);
        assert_eq!(trace.metric(MetricField::Db), Some(12.0));
        assert_eq!(trace.metrics.get("gc"), Some(&3.0));
    }
}
