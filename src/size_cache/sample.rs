use std::collections::VecDeque;

/// Rolling window of recently measured byte sizes for one query signature.
///
/// Strict FIFO: once `max_values` is exceeded the oldest measurement goes,
/// regardless of its magnitude.
#[derive(Debug, Clone)]
pub struct SizeSample {
    max_values: usize,
    values: VecDeque<u64>,
    updated_ms: i64,
}

impl SizeSample {
    pub fn new(max_values: usize) -> Self {
        let max_values = max_values.max(1);
        Self {
            max_values,
            values: VecDeque::with_capacity(max_values + 1),
            updated_ms: 0,
        }
    }

    /// Push a measurement taken at `now_ms`, dropping the oldest if the
    /// window overflows.
    pub fn add(&mut self, value: u64, now_ms: i64) {
        self.values.push_back(value);
        self.updated_ms = now_ms;
        if self.values.len() > self.max_values {
            self.values.pop_front();
        }
    }

    /// Median of the window: middle element for odd lengths, mean of the two
    /// central elements for even lengths, `0.0` when nothing was measured yet.
    pub fn median(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }

        let mut sorted: Vec<u64> = self.values.iter().copied().collect();
        sorted.sort_unstable();

        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 0 {
            (sorted[mid - 1] as f64 + sorted[mid] as f64) / 2.0
        } else {
            sorted[mid] as f64
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn max_values(&self) -> usize {
        self.max_values
    }

    /// Timestamp of the last measurement, `0` if there was none.
    pub fn updated_ms(&self) -> i64 {
        self.updated_ms
    }

    /// Measurements in arrival order, oldest first.
    pub fn values(&self) -> impl Iterator<Item = u64> + '_ {
        self.values.iter().copied()
    }
}
