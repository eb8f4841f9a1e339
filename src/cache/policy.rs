//! Per-call-site cache policy

use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What a query does when caching is disabled or it has no key yet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BypassMode {
    /// Call the producer directly, without touching the cache
    Direct,
    /// Do nothing until a key is available
    Skip,
}

/// Cache policy chosen by a call site
///
/// - `ttl`: absolute lifetime in the store, after which it evicts the entry
/// - `stale_time`: age after which a still-present value is served but
///   refreshed in the background; must not exceed `ttl`
/// - `enabled`: whether the cache is consulted at all
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachePolicy {
    pub ttl: Duration,
    pub stale_time: Duration,
    pub enabled: bool,

    /// Random spread applied to the TTL sent to the store (0.0 - 1.0),
    /// so entries written together do not all expire together
    pub ttl_jitter: f64,

    pub bypass: BypassMode,
}

impl Default for CachePolicy {
    fn default() -> Self {
        // 5 minutes, stale after 1
        Self::new(Duration::from_secs(300), Duration::from_secs(60))
    }
}

impl CachePolicy {
    /// Policy with the given TTL and staleness threshold
    pub fn new(ttl: Duration, stale_time: Duration) -> Self {
        Self {
            ttl,
            stale_time,
            enabled: true,
            ttl_jitter: 0.0,
            bypass: BypassMode::Direct,
        }
    }

    /// Policy from whole seconds and a staleness threshold in milliseconds
    pub fn from_secs_and_millis(ttl_seconds: u64, stale_time_ms: u64) -> Self {
        Self::new(
            Duration::from_secs(ttl_seconds),
            Duration::from_millis(stale_time_ms),
        )
    }

    /// Turn caching on or off for this call site
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the TTL jitter factor
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.ttl_jitter = jitter;
        self
    }

    /// Set what happens when caching is bypassed
    pub fn with_bypass(mut self, bypass: BypassMode) -> Self {
        self.bypass = bypass;
        self
    }

    /// Validate the policy
    pub fn validate(&self) -> Result<()> {
        if self.ttl < Duration::from_secs(1) {
            return Err(CacheError::Config("ttl must be at least 1 second".to_string()));
        }

        if self.stale_time > self.ttl {
            return Err(CacheError::Config(format!(
                "stale_time ({:?}) must not exceed ttl ({:?})",
                self.stale_time, self.ttl
            )));
        }

        if !(0.0..=1.0).contains(&self.ttl_jitter) {
            return Err(CacheError::Config(
                "ttl_jitter must be between 0.0 and 1.0".to_string(),
            ));
        }

        Ok(())
    }

    /// TTL in whole seconds to send with a write, jitter applied, never below 1
    pub fn ttl_seconds(&self) -> u64 {
        let base_secs = self.ttl.as_secs_f64();
        if self.ttl_jitter <= 0.0 {
            return (base_secs.round() as u64).max(1);
        }

        let jitter_range = base_secs * self.ttl_jitter;
        let jitter = (rand::random::<f64>() * 2.0 - 1.0) * jitter_range;
        ((base_secs + jitter).round() as u64).max(1)
    }
}

/// Presets for the application's aggregation queries
impl CachePolicy {
    /// Dashboard counters: 5 minutes, stale after 2
    pub fn dashboard() -> Self {
        Self::new(Duration::from_secs(300), Duration::from_secs(120))
    }

    /// Class rosters change rarely: 10 minutes, stale after 5
    pub fn roster() -> Self {
        Self::new(Duration::from_secs(600), Duration::from_secs(300))
    }

    /// Per-student evolution data: 15 minutes, stale after 5
    pub fn evolution() -> Self {
        Self::new(Duration::from_secs(900), Duration::from_secs(300)).with_jitter(0.10)
    }

    /// Generated reports are expensive: 30 minutes, stale after 10
    pub fn report() -> Self {
        Self::new(Duration::from_secs(1800), Duration::from_secs(600)).with_jitter(0.10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        let policy = CachePolicy::default();
        assert_eq!(policy.ttl, Duration::from_secs(300));
        assert!(policy.enabled);
        assert_eq!(policy.bypass, BypassMode::Direct);
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_policy_validation() {
        let stale_past_ttl = CachePolicy::new(Duration::from_secs(60), Duration::from_secs(61));
        assert!(stale_past_ttl.validate().is_err());

        let sub_second = CachePolicy::new(Duration::from_millis(500), Duration::ZERO);
        assert!(sub_second.validate().is_err());

        let bad_jitter = CachePolicy::default().with_jitter(1.5);
        assert!(bad_jitter.validate().is_err());

        let equal = CachePolicy::new(Duration::from_secs(60), Duration::from_secs(60));
        assert!(equal.validate().is_ok());
    }

    #[test]
    fn test_ttl_seconds_without_jitter() {
        let policy = CachePolicy::from_secs_and_millis(300, 120_000);
        assert_eq!(policy.ttl_seconds(), 300);
        assert_eq!(policy.stale_time, Duration::from_secs(120));
    }

    #[test]
    fn test_ttl_seconds_with_jitter() {
        let policy = CachePolicy::new(Duration::from_secs(3600), Duration::from_secs(60))
            .with_jitter(0.1);

        for _ in 0..50 {
            let ttl = policy.ttl_seconds();
            assert!((3240..=3960).contains(&ttl));
        }
    }

    #[test]
    fn test_presets_are_valid() {
        for policy in [
            CachePolicy::dashboard(),
            CachePolicy::roster(),
            CachePolicy::evolution(),
            CachePolicy::report(),
        ] {
            assert!(policy.validate().is_ok(), "{:?}", policy);
        }
        assert_eq!(CachePolicy::dashboard().stale_time, Duration::from_secs(120));
    }

    #[test]
    fn test_builder_methods() {
        let policy = CachePolicy::default()
            .enabled(false)
            .with_bypass(BypassMode::Skip);
        assert!(!policy.enabled);
        assert_eq!(policy.bypass, BypassMode::Skip);
    }
}
