//! Circuit breaker guarding the upstream HTTP client (§4.13):
//! `CLOSED -> OPEN -> HALF_OPEN`, `N` consecutive failures opens it,
//! a recovery timeout allows one probe, success closes it again.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use nerve_domain::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed,
    Open,
    HalfOpen,
}

pub struct CircuitBreaker {
    failure_threshold: u32,
    recovery: Duration,
    state: Mutex<State>,
    consecutive_failures: AtomicU32,
    opened_at: Mutex<Option<Instant>>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, recovery: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            recovery,
            state: Mutex::new(State::Closed),
            consecutive_failures: AtomicU32::new(0),
            opened_at: Mutex::new(None),
        }
    }

    /// Call before issuing an upstream request. Transitions `OPEN ->
    /// HALF_OPEN` once the recovery timeout has elapsed; otherwise
    /// fails fast.
    pub fn before_call(&self, upstream: &str) -> Result<()> {
        let mut state = self.state.lock();
        if *state == State::Open {
            let opened_at = *self.opened_at.lock();
            let elapsed = opened_at.map(|t| t.elapsed()).unwrap_or(Duration::MAX);
            if elapsed >= self.recovery {
                *state = State::HalfOpen;
            } else {
                return Err(Error::CircuitOpen(upstream.to_string()));
            }
        }
        Ok(())
    }

    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
        *self.state.lock() = State::Closed;
        *self.opened_at.lock() = None;
    }

    /// A probe failing while `HALF_OPEN` reopens immediately; a
    /// `CLOSED` failure only opens once `failure_threshold` consecutive
    /// failures have accumulated.
    pub fn record_failure(&self) {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        let mut state = self.state.lock();
        if *state == State::HalfOpen || failures >= self.failure_threshold {
            *state = State::Open;
            *self.opened_at.lock() = Some(Instant::now());
        }
    }

    pub fn is_open(&self) -> bool {
        *self.state.lock() == State::Open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold_failures() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(30));
        for _ in 0..2 {
            breaker.record_failure();
            assert!(!breaker.is_open());
        }
        breaker.record_failure();
        assert!(breaker.is_open());
        assert!(breaker.before_call("up").is_err());
    }

    #[test]
    fn half_open_probe_failure_reopens() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(0));
        breaker.record_failure();
        assert!(breaker.is_open());
        breaker.before_call("up").unwrap(); // recovery elapsed instantly -> half-open
        breaker.record_failure();
        assert!(breaker.is_open());
    }

    #[test]
    fn success_closes_circuit() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(0));
        breaker.record_failure();
        breaker.before_call("up").unwrap();
        breaker.record_success();
        assert!(!breaker.is_open());
    }
}
