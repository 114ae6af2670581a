//! Per-upstream circuit breaker (§4.5). One instance guards the CDP
//! endpoint configured for this gateway; keyed by `DashMap` the way the
//! crawler's per-domain breaker was, even though this gateway only ever
//! has one key in practice (the CDP endpoint) — kept map-shaped so a
//! future multi-upstream gateway doesn't need a rewrite.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

struct BreakerEntry {
    state: Mutex<CircuitState>,
    failures: AtomicU32,
    opened_at: Mutex<Option<Instant>>,
}

impl BreakerEntry {
    fn new() -> Self {
        Self {
            state: Mutex::new(CircuitState::Closed),
            failures: AtomicU32::new(0),
            opened_at: Mutex::new(None),
        }
    }
}

/// Tracks failure streaks per upstream key and short-circuits acquisition
/// once a key trips open.
pub struct CircuitBreaker {
    entries: DashMap<String, BreakerEntry>,
    fail_max: u32,
    reset_timeout: Duration,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(fail_max: u32, reset_timeout: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            fail_max,
            reset_timeout,
        }
    }

    fn entry(&self, key: &str) -> dashmap::mapref::one::Ref<'_, String, BreakerEntry> {
        if !self.entries.contains_key(key) {
            self.entries
                .entry(key.to_string())
                .or_insert_with(BreakerEntry::new);
        }
        self.entries.get(key).expect("just inserted")
    }

    /// Returns `true` if a render against `key` should be attempted.
    /// CLOSED and HALF_OPEN admit; OPEN admits only once the reset window
    /// has elapsed, at which point it transitions itself to HALF_OPEN and
    /// admits the probe (§4.5).
    #[must_use]
    pub fn should_attempt(&self, key: &str) -> bool {
        let entry = self.entry(key);
        let mut state = entry.state.lock();
        match *state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let opened_at: Option<Instant> = *entry.opened_at.lock();
                let opened_at = opened_at.unwrap_or_else(Instant::now);
                if opened_at.elapsed() >= self.reset_timeout {
                    *state = CircuitState::HalfOpen;
                    info!(key, "circuit breaker half-open, admitting probe");
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Records a success: resets the failure counter, and in HALF_OPEN
    /// transitions back to CLOSED.
    pub fn record_success(&self, key: &str) {
        let entry = self.entry(key);
        entry.failures.store(0, Ordering::SeqCst);
        let mut state = entry.state.lock();
        if *state != CircuitState::Closed {
            info!(key, "circuit breaker closed after successful probe");
        }
        *state = CircuitState::Closed;
    }

    /// Records a failure. In CLOSED, trips to OPEN after `fail_max`
    /// consecutive failures. In HALF_OPEN, trips back to OPEN immediately
    /// with a refreshed `opened_at`.
    pub fn record_failure(&self, key: &str) {
        let entry = self.entry(key);
        let mut state = entry.state.lock();
        match *state {
            CircuitState::HalfOpen => {
                self.trip(&entry, &mut state, key);
            }
            CircuitState::Closed => {
                let failures = entry.failures.fetch_add(1, Ordering::SeqCst) + 1;
                if failures >= self.fail_max {
                    self.trip(&entry, &mut state, key);
                }
            }
            CircuitState::Open => {}
        }
    }

    fn trip(&self, entry: &BreakerEntry, state: &mut CircuitState, key: &str) {
        *state = CircuitState::Open;
        *entry.opened_at.lock() = Some(Instant::now());
        entry.failures.store(0, Ordering::SeqCst);
        warn!(key, "circuit breaker open");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_fail_max_consecutive_failures() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(60));
        assert!(breaker.should_attempt("k"));
        breaker.record_failure("k");
        breaker.record_failure("k");
        assert!(breaker.should_attempt("k"));
        breaker.record_failure("k");
        assert!(!breaker.should_attempt("k"));
    }

    #[test]
    fn success_in_closed_resets_counter() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(60));
        breaker.record_failure("k");
        breaker.record_failure("k");
        breaker.record_success("k");
        breaker.record_failure("k");
        breaker.record_failure("k");
        assert!(breaker.should_attempt("k"));
    }

    #[test]
    fn half_open_failure_reopens_with_refreshed_timer() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(10));
        breaker.record_failure("k");
        assert!(!breaker.should_attempt("k"));
        std::thread::sleep(Duration::from_millis(20));
        assert!(breaker.should_attempt("k")); // transitions to half-open
        breaker.record_failure("k");
        assert!(!breaker.should_attempt("k"));
    }

    #[test]
    fn half_open_success_closes() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(10));
        breaker.record_failure("k");
        std::thread::sleep(Duration::from_millis(20));
        assert!(breaker.should_attempt("k"));
        breaker.record_success("k");
        breaker.record_failure("k");
        // one failure in CLOSED with fail_max=1 reopens immediately
        assert!(!breaker.should_attempt("k"));
    }
}
