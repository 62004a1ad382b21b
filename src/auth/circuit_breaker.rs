//! Circuit breaker guarding calls to the identity provider.
//!
//! - **Closed**: calls pass through; consecutive failures are counted.
//! - **Open**: tripped after `failure_threshold` failures; calls fail fast.
//! - **Half-Open**: after `recovery_timeout` one trial call is let through.
//!
//! State lives in atomics so the breaker can be shared without a lock.

use std::future::Future;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    const fn from_u32(value: u32) -> Self {
        match value {
            0 => Self::Closed,
            1 => Self::Open,
            _ => Self::HalfOpen,
        }
    }

    const fn to_u32(self) -> u32 {
        match self {
            Self::Closed => 0,
            Self::Open => 1,
            Self::HalfOpen => 2,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
    /// Successful trial calls needed in half-open before closing
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 1,
        }
    }
}

#[derive(Debug, Error)]
pub enum BreakerError<E> {
    #[error("circuit '{name}' is open, retry in {retry_after_secs}s")]
    Open { name: String, retry_after_secs: u64 },

    #[error(transparent)]
    Inner(E),
}

pub struct CircuitBreaker {
    name: String,
    state: AtomicU32,
    failure_count: AtomicU32,
    success_count: AtomicU32,
    /// Millis since `start_instant` when the circuit last opened
    opened_at: AtomicU64,
    config: CircuitBreakerConfig,
    start_instant: Instant,
}

impl CircuitBreaker {
    pub fn new(name: &str, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.to_owned(),
            state: AtomicU32::new(CircuitState::Closed.to_u32()),
            failure_count: AtomicU32::new(0),
            success_count: AtomicU32::new(0),
            opened_at: AtomicU64::new(0),
            config,
            start_instant: Instant::now(),
        }
    }

    pub fn state(&self) -> CircuitState {
        CircuitState::from_u32(self.state.load(Ordering::SeqCst))
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count.load(Ordering::SeqCst)
    }

    /// Whether a call may proceed; moves Open to HalfOpen once the timeout passed
    pub fn is_allowed(&self) -> bool {
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::Open => self.try_half_open(),
            // a trial call is already in flight
            CircuitState::HalfOpen => false,
        }
    }

    fn try_half_open(&self) -> bool {
        if self.millis_since_open() < self.recovery_millis() {
            return false;
        }
        let moved = self
            .state
            .compare_exchange(
                CircuitState::Open.to_u32(),
                CircuitState::HalfOpen.to_u32(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok();
        if moved {
            info!(circuit = %self.name, "Circuit breaker half-open, probing");
        }
        moved
    }

    pub fn record_success(&self) {
        match self.state() {
            CircuitState::Closed => self.failure_count.store(0, Ordering::SeqCst),
            CircuitState::HalfOpen => {
                let count = self.success_count.fetch_add(1, Ordering::SeqCst) + 1;
                if count >= self.config.success_threshold {
                    self.state.store(CircuitState::Closed.to_u32(), Ordering::SeqCst);
                    self.failure_count.store(0, Ordering::SeqCst);
                    self.success_count.store(0, Ordering::SeqCst);
                    info!(circuit = %self.name, "Circuit breaker closed");
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        match self.state() {
            CircuitState::Closed => {
                let count = self.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
                if count >= self.config.failure_threshold {
                    self.open();
                    warn!(
                        circuit = %self.name,
                        failures = count,
                        recovery_timeout_secs = self.config.recovery_timeout.as_secs(),
                        "Circuit breaker opened"
                    );
                }
            }
            CircuitState::HalfOpen => {
                self.success_count.store(0, Ordering::SeqCst);
                self.open();
                warn!(circuit = %self.name, "Circuit breaker re-opened, trial call failed");
            }
            CircuitState::Open => self.opened_at.store(self.elapsed_millis(), Ordering::SeqCst),
        }
    }

    fn open(&self) {
        self.state.store(CircuitState::Open.to_u32(), Ordering::SeqCst);
        self.opened_at.store(self.elapsed_millis(), Ordering::SeqCst);
    }

    /// Run `operation` if the circuit allows it, recording the outcome
    pub async fn call<F, T, E>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: Future<Output = Result<T, E>>,
    {
        if !self.is_allowed() {
            return Err(BreakerError::Open {
                name: self.name.clone(),
                retry_after_secs: self.secs_until_recovery(),
            });
        }
        let mut pending = PendingCall { breaker: self, finished: false };
        let outcome = operation.await;
        pending.finished = true;
        match outcome {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(e) => {
                self.record_failure();
                Err(BreakerError::Inner(e))
            }
        }
    }

    fn secs_until_recovery(&self) -> u64 {
        self.recovery_millis()
            .saturating_sub(self.millis_since_open())
            .saturating_add(999)
            / 1000
    }

    fn millis_since_open(&self) -> u64 {
        self.elapsed_millis()
            .saturating_sub(self.opened_at.load(Ordering::SeqCst))
    }

    #[allow(clippy::cast_possible_truncation)]
    fn recovery_millis(&self) -> u64 {
        self.config.recovery_timeout.as_millis() as u64
    }

    #[allow(clippy::cast_possible_truncation)]
    fn elapsed_millis(&self) -> u64 {
        self.start_instant.elapsed().as_millis() as u64
    }
}

/// A half-open trial call dropped before completion counts as a failure
struct PendingCall<'a> {
    breaker: &'a CircuitBreaker,
    finished: bool,
}

impl Drop for PendingCall<'_> {
    fn drop(&mut self) {
        if !self.finished && self.breaker.state() == CircuitState::HalfOpen {
            warn!(circuit = %self.breaker.name, "Trial call cancelled before completing");
            self.breaker.record_failure();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(recovery: Duration) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig {
                failure_threshold: 2,
                recovery_timeout: recovery,
                success_threshold: 1,
            },
        )
    }

    #[tokio::test]
    async fn opens_after_threshold() {
        let cb = breaker(Duration::from_secs(60));
        for _ in 0..2 {
            let r: Result<(), _> = cb.call(async { Err::<(), _>("boom") }).await;
            assert!(matches!(r, Err(BreakerError::Inner("boom"))));
        }
        assert_eq!(cb.state(), CircuitState::Open);

        let r = cb.call(async { Ok::<_, &str>(1) }).await;
        assert!(matches!(r, Err(BreakerError::Open { .. })));
    }

    #[tokio::test]
    async fn half_open_trial_closes_on_success() {
        let cb = breaker(Duration::from_millis(0));
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        let r = cb.call(async { Ok::<_, &str>(7) }).await;
        assert_eq!(r.unwrap(), 7);
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 0);
    }

    #[tokio::test]
    async fn failed_trial_reopens() {
        let cb = breaker(Duration::from_millis(0));
        cb.record_failure();
        cb.record_failure();
        assert!(cb.is_allowed());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn cancelled_trial_does_not_wedge_half_open() {
        let cb = breaker(Duration::from_millis(0));
        cb.record_failure();
        cb.record_failure();

        let cancelled = tokio::time::timeout(
            Duration::from_millis(10),
            cb.call(std::future::pending::<Result<(), &str>>()),
        )
        .await;
        assert!(cancelled.is_err());
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(50)).await;
        let r = cb.call(async { Ok::<_, &str>(1) }).await;
        assert_eq!(r.unwrap(), 1);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn cancelled_call_while_closed_is_not_a_failure() {
        let cb = breaker(Duration::from_secs(60));
        let _ = tokio::time::timeout(
            Duration::from_millis(5),
            cb.call(std::future::pending::<Result<(), &str>>()),
        )
        .await;
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.failure_count(), 0);
    }

    #[test]
    fn success_resets_failure_count() {
        let cb = breaker(Duration::from_secs(60));
        cb.record_failure();
        cb.record_success();
        assert_eq!(cb.failure_count(), 0);
        assert_eq!(cb.state(), CircuitState::Closed);
    }
}
