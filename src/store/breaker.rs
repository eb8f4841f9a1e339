//! Circuit breaker guarding the remote store
//!
//! A hard failure opens the breaker and every later call short-circuits to
//! a miss. Without a cooldown the breaker stays open for the lifetime of the
//! client. With a cooldown, one probe request is let through once it has
//! elapsed: success closes the breaker, failure re-opens it. A probe that
//! never settles (its caller was cancelled) is replaced by a new one after
//! another cooldown.

use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    /// Requests flow normally
    Closed,
    /// Requests are short-circuited
    Open,
    /// A single probe request is in flight
    HalfOpen,
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakerState::Closed => write!(f, "closed"),
            BreakerState::Open => write!(f, "open"),
            BreakerState::HalfOpen => write!(f, "half_open"),
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    opened_at: Option<Instant>,
    probe_started_at: Option<Instant>,
    trips: u64,
}

/// Circuit breaker with an optional half-open cooldown
#[derive(Debug)]
pub struct CircuitBreaker {
    cooldown: Option<Duration>,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a breaker; `None` means it never closes again once open
    pub fn new(cooldown: Option<Duration>) -> Self {
        Self {
            cooldown,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                opened_at: None,
                probe_started_at: None,
                trips: 0,
            }),
        }
    }

    /// Breaker that stays open for the rest of the process once tripped
    pub fn never_reset() -> Self {
        Self::new(None)
    }

    fn lock(&self) -> MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ask permission to make a request
    pub fn try_acquire(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed => true,
            BreakerState::HalfOpen => {
                let Some(cooldown) = self.cooldown else {
                    return false;
                };
                let elapsed = inner.probe_started_at.map(|at| at.elapsed()).unwrap_or_default();
                if elapsed >= cooldown {
                    warn!("Cache store probe unsettled after {:?}, probing again", elapsed);
                    inner.probe_started_at = Some(Instant::now());
                    true
                } else {
                    false
                }
            }
            BreakerState::Open => {
                let Some(cooldown) = self.cooldown else {
                    return false;
                };
                let elapsed = inner.opened_at.map(|at| at.elapsed()).unwrap_or_default();
                if elapsed >= cooldown {
                    info!("Cache store cooldown elapsed after {:?}, probing", elapsed);
                    inner.state = BreakerState::HalfOpen;
                    inner.probe_started_at = Some(Instant::now());
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record that the backend answered
    pub fn record_success(&self) {
        let mut inner = self.lock();
        if inner.state == BreakerState::HalfOpen {
            info!("Cache store probe succeeded, closing circuit");
            inner.state = BreakerState::Closed;
            inner.opened_at = None;
            inner.probe_started_at = None;
        }
    }

    /// Record a hard failure; opens the breaker
    pub fn record_failure(&self) {
        let mut inner = self.lock();
        if inner.state != BreakerState::Open {
            inner.trips += 1;
            match self.cooldown {
                Some(cooldown) => warn!(
                    "Cache store disabled after failure, retrying in {:?}",
                    cooldown
                ),
                None => warn!("Cache store disabled for the rest of this process"),
            }
        }
        inner.state = BreakerState::Open;
        inner.opened_at = Some(Instant::now());
        inner.probe_started_at = None;
    }

    /// Current state
    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    /// Whether calls are currently being short-circuited
    pub fn is_open(&self) -> bool {
        self.state() != BreakerState::Closed
    }

    /// Number of times the breaker has opened
    pub fn trips(&self) -> u64 {
        self.lock().trips
    }

    /// Configured cooldown
    pub fn cooldown(&self) -> Option<Duration> {
        self.cooldown
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::never_reset()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_starts_closed() {
        let breaker = CircuitBreaker::default();
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert!(breaker.try_acquire());
        assert_eq!(breaker.trips(), 0);
    }

    #[test]
    fn test_never_reset_stays_open() {
        let breaker = CircuitBreaker::never_reset();
        breaker.record_failure();

        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.try_acquire());
        sleep(Duration::from_millis(20));
        assert!(!breaker.try_acquire());

        // A stray success does not close an open breaker
        breaker.record_success();
        assert!(breaker.is_open());
    }

    #[test]
    fn test_cooldown_probe_closes_on_success() {
        let breaker = CircuitBreaker::new(Some(Duration::from_millis(30)));
        breaker.record_failure();
        assert!(!breaker.try_acquire());

        sleep(Duration::from_millis(40));
        assert!(breaker.try_acquire());
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        // Only one probe at a time
        assert!(!breaker.try_acquire());

        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert!(breaker.try_acquire());
    }

    #[test]
    fn test_cooldown_probe_reopens_on_failure() {
        let breaker = CircuitBreaker::new(Some(Duration::from_millis(30)));
        breaker.record_failure();
        sleep(Duration::from_millis(40));
        assert!(breaker.try_acquire());

        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.try_acquire());
        assert_eq!(breaker.trips(), 2);
    }

    #[test]
    fn test_unsettled_probe_is_replaced_after_cooldown() {
        let breaker = CircuitBreaker::new(Some(Duration::from_millis(30)));
        breaker.record_failure();
        sleep(Duration::from_millis(40));
        assert!(breaker.try_acquire());

        // The probe's caller went away without recording an outcome
        assert!(!breaker.try_acquire());
        sleep(Duration::from_millis(40));
        assert!(breaker.try_acquire());
        assert_eq!(breaker.state(), BreakerState::HalfOpen);

        breaker.record_success();
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert_eq!(breaker.trips(), 1);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(BreakerState::Closed.to_string(), "closed");
        assert_eq!(BreakerState::HalfOpen.to_string(), "half_open");
    }
}
