//! Adaptive-refresh estimator for the serialized size of query results.
//!
//! Measuring a result means serializing it, which is too expensive to do on
//! every call. Instead each query signature keeps a small window of past
//! measurements and a fresh one is taken only when the window is cold,
//! stale, or the refresh score says it is worth it.

pub mod dataset;
pub mod lru;
pub mod sample;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, trace};

use crate::canonical;
use crate::clock::Clock;
use crate::config::AgentConfig;

pub use dataset::Dataset;
pub use lru::LruMap;
pub use sample::SizeSample;

// ─── Configuration ───────────────────────────────────────────────

/// Hard ceiling on estimate age: older samples are always refreshed.
pub const STALENESS_CEILING_MS: i64 = 60_000;

/// Refresh when the composite score exceeds this.
const REFRESH_SCORE_THRESHOLD: f64 = 0.5;

// ─── CpuGauge ────────────────────────────────────────────────────

/// Process CPU utilization in percent, written by an external sampler and
/// read by the refresh score. Clones share the same reading.
#[derive(Debug, Clone, Default)]
pub struct CpuGauge {
    bits: Arc<AtomicU64>,
}

impl CpuGauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, pcpu: f64) {
        self.bits.store(pcpu.to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

// ─── SizeEstimateCache ───────────────────────────────────────────

pub struct SizeEstimateCache {
    items: Mutex<LruMap<String, SizeSample>>,
    max_values: usize,
    cpu: CpuGauge,
    clock: Arc<dyn Clock>,
}

impl SizeEstimateCache {
    pub fn new(
        max_items: usize,
        max_values: usize,
        cpu: CpuGauge,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            items: Mutex::new(LruMap::new(max_items)),
            max_values: max_values.max(1),
            cpu,
            clock,
        }
    }

    pub fn from_config(
        config: &AgentConfig,
        cpu: CpuGauge,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::new(config.max_items, config.max_values, cpu, clock)
    }

    /// Update the shared CPU reading the refresh score uses.
    pub fn set_pcpu(&self, pcpu: f64) {
        self.cpu.set(pcpu);
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Cache key for a query signature. Equal inputs produce equal keys
    /// regardless of property order.
    pub fn key<C, Q, O>(collection: &C, query: &Q, options: &O) -> String
    where
        C: Serialize + ?Sized,
        Q: Serialize + ?Sized,
        O: Serialize + ?Sized,
    {
        canonical::to_canonical_string(&(collection, query, options))
    }

    /// Estimated encoded size of one document in `dataset`.
    ///
    /// Returns `0.0` with no side effect when the dataset is missing or
    /// empty. Otherwise returns the median of the signature's measurement
    /// window, after taking a new measurement if one is due.
    pub fn get_size<C, Q, O, D>(
        &self,
        collection: &C,
        query: &Q,
        options: &O,
        dataset: Option<&D>,
    ) -> f64
    where
        C: Serialize + ?Sized,
        Q: Serialize + ?Sized,
        O: Serialize + ?Sized,
        D: Dataset + ?Sized,
    {
        let Some(dataset) = dataset.filter(|d| !d.is_empty()) else {
            return 0.0;
        };

        let key = Self::key(collection, query, options);
        let now = self.clock.now_ms();

        let mut items = self.items.lock();
        let (sample, evicted) = items.get_or_insert_with(key, || {
            SizeSample::new(self.max_values)
        });
        if let Some((evicted_key, _)) = evicted {
            debug!(key = %evicted_key, "size cache evicted signature");
        }

        if self.needs_update(sample, now) {
            if let Some(doc) = dataset.sample_item() {
                let size = canonical::encoded_len(doc) as u64;
                sample.add(size, now);
                trace!(size, samples = sample.len(), "size cache refreshed");
            }
        }

        sample.median()
    }

    /// Refresh priority in `[0, 1]`: the equal-weight mean of remaining
    /// window capacity, staleness, and CPU headroom, each clamped to `[0, 1]`.
    pub fn item_score(&self, sample: &SizeSample, now_ms: i64) -> f64 {
        let max = sample.max_values() as f64;
        let capacity = (max - sample.len() as f64) / max;
        let staleness =
            (now_ms - sample.updated_ms()) as f64 / STALENESS_CEILING_MS as f64;
        let headroom = (100.0 - self.cpu.get()) / 100.0;

        [capacity, staleness, headroom]
            .iter()
            .map(|s| s.clamp(0.0, 1.0))
            .sum::<f64>()
            / 3.0
    }

    pub fn needs_update(&self, sample: &SizeSample, now_ms: i64) -> bool {
        if sample.is_empty() {
            return true;
        }
        if now_ms - sample.updated_ms() > STALENESS_CEILING_MS {
            return true;
        }
        self.item_score(sample, now_ms) > REFRESH_SCORE_THRESHOLD
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;
    use crate::clock::ManualClock;

    fn cache(max_items: usize, max_values: usize) -> (SizeEstimateCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let cache =
            SizeEstimateCache::new(max_items, max_values, CpuGauge::new(), clock.clone());
        (cache, clock)
    }

    fn doc_of_len(n: usize) -> Value {
        // {"d":"xxx"} is 8 bytes of framing
        json!({ "d": "x".repeat(n - 8) })
    }

    #[test]
    fn empty_or_missing_dataset_is_zero() {
        let (cache, _) = cache(4, 4);
        let empty: Vec<Value> = Vec::new();
        assert_eq!(cache.get_size("posts", &json!({}), &json!({}), Some(&empty)), 0.0);
        assert_eq!(
            cache.get_size::<_, _, _, Vec<Value>>("posts", &json!({}), &json!({}), None),
            0.0
        );
        assert!(cache.is_empty());
    }

    #[test]
    fn first_call_measures_first_document() {
        let (cache, _) = cache(4, 4);
        let rows = vec![doc_of_len(20), doc_of_len(500)];
        let size = cache.get_size("posts", &json!({"a": 1}), &json!({}), Some(&rows));
        assert_eq!(size, 20.0);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn map_datasets_sample_in_key_order() {
        let (cache, _) = cache(4, 4);
        let mut by_id = std::collections::BTreeMap::new();
        by_id.insert("b", doc_of_len(40));
        by_id.insert("a", doc_of_len(16));
        assert_eq!(cache.get_size("c", &(), &(), Some(&by_id)), 16.0);
    }

    #[test]
    fn key_ignores_property_order() {
        let a = SizeEstimateCache::key("c", &json!({"x": 1, "y": 2}), &json!({"limit": 5}));
        let mut q = serde_json::Map::new();
        q.insert("y".into(), json!(2));
        q.insert("x".into(), json!(1));
        let b = SizeEstimateCache::key("c", &Value::Object(q), &json!({"limit": 5}));
        assert_eq!(a, b);
    }

    #[test]
    fn fresh_sample_always_needs_update() {
        let (cache, clock) = cache(4, 4);
        cache.set_pcpu(100.0);
        let sample = SizeSample::new(4);
        assert!(cache.needs_update(&sample, clock.now_ms()));
    }

    #[test]
    fn stale_sample_always_needs_update() {
        let (cache, clock) = cache(4, 1);
        cache.set_pcpu(100.0);
        let mut sample = SizeSample::new(1);
        sample.add(10, clock.now_ms());
        // full window, busy CPU, just refreshed: score is 0
        assert!(!cache.needs_update(&sample, clock.now_ms()));
        clock.advance(STALENESS_CEILING_MS + 1);
        assert!(cache.needs_update(&sample, clock.now_ms()));
    }

    #[test]
    fn score_averages_three_signals() {
        let (cache, clock) = cache(4, 4);
        let now = clock.now_ms();
        let mut sample = SizeSample::new(4);
        sample.add(1, now - 30_000);
        cache.set_pcpu(50.0);
        // capacity 0.75, staleness 0.5, headroom 0.5
        let score = cache.item_score(&sample, now);
        assert!((score - 1.75 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn score_signals_are_clamped() {
        let (cache, clock) = cache(4, 2);
        let now = clock.now_ms();
        let mut sample = SizeSample::new(2);
        sample.add(1, now - 10 * STALENESS_CEILING_MS);
        cache.set_pcpu(250.0);
        // capacity 0.5, staleness clamps to 1, headroom clamps to 0
        assert!((cache.item_score(&sample, now) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn score_is_monotonic_in_staleness_and_cpu() {
        let (cache, clock) = cache(4, 5);
        let now = clock.now_ms();
        let mut sample = SizeSample::new(5);
        sample.add(1, now);

        let mut last = f64::MIN;
        for age in [0, 5_000, 20_000, 59_000, 120_000] {
            let score = cache.item_score(&sample, now + age);
            assert!(score >= last);
            last = score;
        }

        let mut last = f64::MIN;
        for pcpu in [100.0, 80.0, 40.0, 0.0] {
            cache.set_pcpu(pcpu);
            let score = cache.item_score(&sample, now);
            assert!(score >= last);
            last = score;
        }
    }

    #[test]
    fn busy_cpu_with_full_window_reuses_median() {
        let (cache, clock) = cache(4, 1);
        let q = json!({});
        assert_eq!(cache.get_size("c", &q, &q, Some(&vec![doc_of_len(30)])), 30.0);

        cache.set_pcpu(100.0);
        clock.advance(1_000);
        // a different document would change the estimate if re-measured
        assert_eq!(cache.get_size("c", &q, &q, Some(&vec![doc_of_len(90)])), 30.0);

        clock.advance(STALENESS_CEILING_MS);
        assert_eq!(cache.get_size("c", &q, &q, Some(&vec![doc_of_len(90)])), 90.0);
    }

    #[test]
    fn idle_cpu_fills_window_and_reports_median() {
        let (cache, clock) = cache(4, 3);
        let q = json!({"k": "v"});
        cache.get_size("c", &q, &(), Some(&vec![doc_of_len(10)]));
        // capacity 2/3 + headroom 1 clears the threshold on its own
        cache.get_size("c", &q, &(), Some(&vec![doc_of_len(50)]));
        // capacity 1/3 + headroom 1 does not; a quarter minute of age does
        clock.advance(15_000);
        let median = cache.get_size("c", &q, &(), Some(&vec![doc_of_len(20)]));
        assert_eq!(median, 20.0);
    }

    #[test]
    fn signatures_are_evicted_lru() {
        let (cache, _) = cache(2, 3);
        let rows = vec![doc_of_len(12)];
        cache.get_size("a", &(), &(), Some(&rows));
        cache.get_size("b", &(), &(), Some(&rows));
        cache.get_size("a", &(), &(), Some(&rows));
        cache.get_size("c", &(), &(), Some(&rows));
        assert_eq!(cache.len(), 2);

        let items = cache.items.lock();
        assert!(items.contains(&SizeEstimateCache::key("a", &(), &())));
        assert!(!items.contains(&SizeEstimateCache::key("b", &(), &())));
    }

    #[test]
    fn gauge_clones_share_reading() {
        let gauge = CpuGauge::new();
        let (cache, _) = cache(1, 1);
        let cache = SizeEstimateCache { cpu: gauge.clone(), ..cache };
        cache.set_pcpu(42.5);
        assert_eq!(gauge.get(), 42.5);
    }
}
