//! In-process telemetry aggregation for an application performance agent.
//!
//! Two pieces do the real work:
//!
//! * [`SizeEstimateCache`] estimates the encoded size of query results from
//!   a rolling median, re-measuring only when a cheap score says so.
//! * [`MetricsAggregator`] rolls method call traces and size events into
//!   one-minute buckets and drains them into an upload [`Payload`].
//!
//! Wall-clock time and trace sampling are collaborators behind the
//! [`Clock`] and [`TraceStore`] traits.

pub mod canonical;
pub mod clock;
pub mod config;
pub mod error;
pub mod metrics;
pub mod size_cache;

pub use clock::{Clock, ManualClock, SyncedClock};
pub use config::AgentConfig;
pub use error::{Error, Result};
pub use metrics::{
    BufferedTraceStore, MethodTrace, MetricField, MetricsAggregator, Payload, SamplingPolicy,
    TraceStore,
};
pub use size_cache::{CpuGauge, Dataset, SizeEstimateCache};
