//! Failure-triggered circuit breaker around provider calls.
//!
//! After `fail_threshold` consecutive final failures the circuit opens for
//! `cooldown`; while open, calls short-circuit without any I/O. The first
//! call after the cooldown is attempted again (half-open); any success
//! resets the failure count.

use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct BreakerState {
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    fail_threshold: u32,
    cooldown: Duration,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(fail_threshold: u32, cooldown: Duration) -> Self {
        Self {
            fail_threshold: fail_threshold.max(1),
            cooldown,
            state: Mutex::new(BreakerState {
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    /// Whether a call may proceed. An open circuit past its cooldown moves
    /// to half-open and admits the probe call.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match state.opened_at {
            Some(opened) if opened.elapsed() < self.cooldown => false,
            Some(_) => {
                // Half-open: let one call through; on_failure re-opens.
                state.opened_at = None;
                true
            }
            None => true,
        }
    }

    pub fn on_success(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.consecutive_failures = 0;
        state.opened_at = None;
    }

    pub fn on_failure(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.consecutive_failures += 1;
        if state.consecutive_failures >= self.fail_threshold {
            tracing::warn!(
                "circuit opened after {} consecutive failures, cooling down {:?}",
                state.consecutive_failures,
                self.cooldown
            );
            state.opened_at = Some(Instant::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opens_at_threshold_and_short_circuits() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(60));
        for _ in 0..2 {
            assert!(breaker.try_acquire());
            breaker.on_failure();
        }
        assert!(breaker.try_acquire(), "still closed below threshold");
        breaker.on_failure();
        // Calls 4..=10 are short-circuited without touching the provider.
        for _ in 4..=10 {
            assert!(!breaker.try_acquire());
        }
    }

    #[test]
    fn test_half_open_after_cooldown() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(10));
        breaker.on_failure();
        assert!(!breaker.try_acquire());
        std::thread::sleep(Duration::from_millis(15));
        assert!(breaker.try_acquire(), "probe call admitted after cooldown");
        // Probe fails: circuit re-opens immediately.
        breaker.on_failure();
        assert!(!breaker.try_acquire());
    }

    #[test]
    fn test_success_resets_failure_count() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(60));
        breaker.on_failure();
        breaker.on_failure();
        breaker.on_success();
        breaker.on_failure();
        breaker.on_failure();
        assert!(breaker.try_acquire(), "count restarted after success");
    }
}
