//! Statistics for cache performance monitoring

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of read-through cache counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CacheStats {
    /// Hits younger than the staleness threshold
    pub fresh_hits: u64,

    /// Hits served stale while a refresh ran
    pub stale_hits: u64,

    /// Lookups that found nothing usable
    pub misses: u64,

    /// Calls that skipped the cache because it was disabled or keyless
    pub bypasses: u64,

    /// Producer invocations
    pub producer_calls: u64,

    /// Producer invocations that failed
    pub producer_errors: u64,

    /// Background refreshes started after a stale hit
    pub background_refreshes: u64,

    /// Callers that joined an in-flight producer call instead of starting one
    pub deduplicated: u64,

    /// Cache writes the store did not acknowledge
    pub failed_writes: u64,
}

impl CacheStats {
    /// Total lookups that reached the store
    pub fn lookups(&self) -> u64 {
        self.fresh_hits + self.stale_hits + self.misses
    }

    /// Hit rate (fresh and stale) as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.lookups();
        if total == 0 {
            0.0
        } else {
            ((self.fresh_hits + self.stale_hits) as f64 / total as f64) * 100.0
        }
    }

    /// Miss rate as a percentage
    pub fn miss_rate(&self) -> f64 {
        100.0 - self.hit_rate()
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CacheStats {{ fresh_hits: {}, stale_hits: {}, misses: {}, hit_rate: {:.2}%, producer_calls: {}, producer_errors: {}, deduplicated: {} }}",
            self.fresh_hits,
            self.stale_hits,
            self.misses,
            self.hit_rate(),
            self.producer_calls,
            self.producer_errors,
            self.deduplicated
        )
    }
}

/// Lock-free counters behind [`CacheStats`]
#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
    fresh_hits: AtomicU64,
    stale_hits: AtomicU64,
    misses: AtomicU64,
    bypasses: AtomicU64,
    producer_calls: AtomicU64,
    producer_errors: AtomicU64,
    background_refreshes: AtomicU64,
    deduplicated: AtomicU64,
    failed_writes: AtomicU64,
}

impl StatsRecorder {
    pub fn fresh_hit(&self) {
        self.fresh_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stale_hit(&self) {
        self.stale_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bypass(&self) {
        self.bypasses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn producer_call(&self) {
        self.producer_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn producer_error(&self) {
        self.producer_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn background_refresh(&self) {
        self.background_refreshes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn deduplicated(&self) {
        self.deduplicated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn failed_write(&self) {
        self.failed_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStats {
        CacheStats {
            fresh_hits: self.fresh_hits.load(Ordering::Relaxed),
            stale_hits: self.stale_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            bypasses: self.bypasses.load(Ordering::Relaxed),
            producer_calls: self.producer_calls.load(Ordering::Relaxed),
            producer_errors: self.producer_errors.load(Ordering::Relaxed),
            background_refreshes: self.background_refreshes.load(Ordering::Relaxed),
            deduplicated: self.deduplicated.load(Ordering::Relaxed),
            failed_writes: self.failed_writes.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        let stats = CacheStats {
            fresh_hits: 60,
            stale_hits: 20,
            misses: 20,
            ..Default::default()
        };
        assert_eq!(stats.hit_rate(), 80.0);
        assert_eq!(stats.miss_rate(), 20.0);
        assert_eq!(stats.lookups(), 100);
    }

    #[test]
    fn test_zero_lookups() {
        let stats = CacheStats::default();
        assert_eq!(stats.hit_rate(), 0.0);
        assert_eq!(stats.miss_rate(), 100.0);
    }

    #[test]
    fn test_recorder_snapshot() {
        let recorder = StatsRecorder::default();
        recorder.fresh_hit();
        recorder.miss();
        recorder.miss();
        recorder.producer_call();
        recorder.deduplicated();

        let stats = recorder.snapshot();
        assert_eq!(stats.fresh_hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.producer_calls, 1);
        assert_eq!(stats.deduplicated, 1);
        assert_eq!(stats.stale_hits, 0);
    }

    #[test]
    fn test_display() {
        let stats = CacheStats {
            fresh_hits: 3,
            misses: 1,
            ..Default::default()
        };
        let display = stats.to_string();
        assert!(display.contains("fresh_hits: 3"));
        assert!(display.contains("hit_rate: 75.00%"));
    }
}
