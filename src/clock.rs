use std::sync::atomic::{AtomicI64, Ordering};

/// Synchronized wall clock consumed by the aggregator and the size cache.
///
/// `now_ms` is local epoch time; `sync_time` maps a local timestamp onto the
/// shared server clock.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
    fn sync_time(&self, local_ms: i64) -> i64;
}

// ─── SyncedClock ─────────────────────────────────────────────────

/// Local system time plus a server offset that an external time-sync
/// job keeps up to date.
#[derive(Debug, Default)]
pub struct SyncedClock {
    offset_ms: AtomicI64,
}

impl SyncedClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the measured difference `server - local`.
    pub fn set_offset(&self, offset_ms: i64) {
        self.offset_ms.store(offset_ms, Ordering::Relaxed);
    }

    pub fn offset(&self) -> i64 {
        self.offset_ms.load(Ordering::Relaxed)
    }
}

impl Clock for SyncedClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    fn sync_time(&self, local_ms: i64) -> i64 {
        local_ms + self.offset()
    }
}

// ─── ManualClock ─────────────────────────────────────────────────

/// A clock that only moves when told to. Used by tests and simulations.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicI64,
    offset_ms: AtomicI64,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now_ms: AtomicI64::new(start_ms),
            offset_ms: AtomicI64::new(0),
        }
    }

    pub fn set(&self, now_ms: i64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: i64) {
        self.now_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }

    pub fn set_offset(&self, offset_ms: i64) {
        self.offset_ms.store(offset_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }

    fn sync_time(&self, local_ms: i64) -> i64 {
        local_ms + self.offset_ms.load(Ordering::SeqCst)
    }
}
