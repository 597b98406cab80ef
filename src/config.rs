use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Deserializer};

use crate::error::{Error, Result};
use crate::metrics::MetricField;

// ─── Agent configuration ─────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Distinct query signatures tracked by the size-estimation cache
    #[serde(default = "default_max_items")]
    pub max_items: usize,

    /// Size samples kept per query signature
    #[serde(default = "default_max_values")]
    pub max_values: usize,

    /// How often the payload builder drains the aggregator (ms)
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    /// Upper bound on traces buffered between two drains
    #[serde(default = "default_trace_buffer_capacity")]
    pub trace_buffer_capacity: usize,

    /// Address the inspection server binds to
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Number of synthetic workers feeding the aggregator
    #[serde(default = "default_load_concurrency")]
    pub load_concurrency: u32,

    /// Whether the synthetic load generator runs at all
    #[serde(default = "default_load_enabled")]
    pub load_enabled: bool,

    /// Per-field outlier thresholds (ms). A successful trace exceeding any
    /// of them is always kept. Overrides merge over the defaults.
    #[serde(
        default = "default_metrics_threshold",
        deserialize_with = "merge_metrics_threshold"
    )]
    pub metrics_threshold: HashMap<MetricField, f64>,

    /// Keep one trace per method at least this often (minutes), 0 disables
    #[serde(default = "default_archive_every_minutes")]
    pub archive_every_minutes: i64,
}

fn default_max_items() -> usize {
    1000
}
fn default_max_values() -> usize {
    10
}
fn default_flush_interval_ms() -> u64 {
    10_000
}
fn default_trace_buffer_capacity() -> usize {
    500
}
fn default_listen_addr() -> String {
    "0.0.0.0:3000".into()
}
fn default_load_concurrency() -> u32 {
    4
}
fn default_load_enabled() -> bool {
    true
}
fn default_archive_every_minutes() -> i64 {
    5
}

pub fn default_metrics_threshold() -> HashMap<MetricField, f64> {
    HashMap::from([
        (MetricField::Wait, 100.0),
        (MetricField::Db, 100.0),
        (MetricField::Http, 1000.0),
        (MetricField::Email, 100.0),
        (MetricField::Async, 100.0),
        (MetricField::Compute, 100.0),
        (MetricField::Total, 200.0),
    ])
}

fn merge_metrics_threshold<'de, D>(
    deserializer: D,
) -> std::result::Result<HashMap<MetricField, f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let overrides = HashMap::<MetricField, f64>::deserialize(deserializer)?;
    let mut thresholds = default_metrics_threshold();
    thresholds.extend(overrides);
    Ok(thresholds)
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_items: default_max_items(),
            max_values: default_max_values(),
            flush_interval_ms: default_flush_interval_ms(),
            trace_buffer_capacity: default_trace_buffer_capacity(),
            listen_addr: default_listen_addr(),
            load_concurrency: default_load_concurrency(),
            load_enabled: default_load_enabled(),
            metrics_threshold: default_metrics_threshold(),
            archive_every_minutes: default_archive_every_minutes(),
        }
    }
}

impl AgentConfig {
    /// Parse and validate a JSON document. Missing fields fall back to
    /// their defaults.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_items == 0 {
            return Err(Error::InvalidConfig(
                "max_items must be greater than 0".into(),
            ));
        }
        if self.max_values == 0 {
            return Err(Error::InvalidConfig(
                "max_values must be greater than 0".into(),
            ));
        }
        if self.flush_interval_ms == 0 {
            return Err(Error::InvalidConfig(
                "flush_interval_ms must be greater than 0".into(),
            ));
        }
        if self.trace_buffer_capacity == 0 {
            return Err(Error::InvalidConfig(
                "trace_buffer_capacity must be greater than 0".into(),
            ));
        }
        if self.archive_every_minutes < 0 {
            return Err(Error::InvalidConfig(
                "archive_every_minutes must not be negative".into(),
            ));
        }
        if self.metrics_threshold.values().any(|t| !t.is_finite() || *t < 0.0) {
            return Err(Error::InvalidConfig(
                "metrics_threshold values must be non-negative numbers".into(),
            ));
        }
        Ok(())
    }
}
