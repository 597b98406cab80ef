use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use super::aggregator::{MethodMetrics, MinuteBucket};
use super::{MethodTrace, MetricField};
use crate::clock::Clock;

/// Upload-ready result of one drain.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Payload {
    pub method_metrics: Vec<BucketSummary>,
    pub method_requests: Vec<MethodTrace>,
}

impl Payload {
    pub fn is_empty(&self) -> bool {
        self.method_metrics.is_empty() && self.method_requests.is_empty()
    }
}

/// One drained minute, with `start_time` on the server clock.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketSummary {
    pub start_time: i64,
    pub end_time: i64,
    pub methods: BTreeMap<String, MethodAverages>,
}

/// Per-call averages for one method over one minute.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodAverages {
    pub count: u64,
    pub errors: u64,
    pub fetched_doc_size: f64,
    pub sent_msg_size: f64,
    pub wait: f64,
    pub db: f64,
    pub http: f64,
    pub email: f64,
    #[serde(rename = "async")]
    pub r#async: f64,
    pub compute: f64,
    pub total: f64,
}

impl MethodAverages {
    /// Divide every sum by `count`.
    ///
    /// A method that only saw size events has `count == 0`. There is no call
    /// to average over, so every field, sizes included, stays at zero.
    pub fn from_metrics(name: &str, metrics: &MethodMetrics) -> Self {
        let mut out = Self {
            count: metrics.count,
            errors: metrics.errors,
            ..Self::default()
        };

        if metrics.count == 0 {
            debug!(
                method = name,
                fetched = metrics.fetched_doc_size,
                sent = metrics.sent_msg_size,
                "no calls merged, size totals not averaged"
            );
            return out;
        }

        let n = metrics.count as f64;
        out.fetched_doc_size = metrics.fetched_doc_size as f64 / n;
        out.sent_msg_size = metrics.sent_msg_size as f64 / n;
        for field in MetricField::ALL {
            *out.field_mut(field) = metrics.field(field) / n;
        }
        out
    }

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
}

impl BucketSummary {
    /// Turn a drained bucket into its upload form.
    ///
    /// Buckets that only saw size events have no trace timestamps; they
    /// fall back to the start of their minute.
    pub fn finalize(bucket: MinuteBucket, clock: &dyn Clock) -> Self {
        let local_start = bucket.start_time.unwrap_or_else(|| bucket.window_start());
        let end_time = bucket.end_time.unwrap_or(local_start);

        let methods = bucket
            .methods
            .into_iter()
            .map(|(name, metrics)| {
                let averages = MethodAverages::from_metrics(&name, &metrics);
                (name, averages)
            })
            .collect();

        Self {
            start_time: clock.sync_time(local_start),
            end_time,
            methods,
        }
    }
}
