//! Trips after a run of consecutive failures talking to the external BT
//! engine's control API, and probes once the cooldown window elapses.
//! Grounded on the teacher's `api/circuit_breaker.rs`: same three-state
//! machine (closed/open/half-open), generalised with a public `state()`
//! accessor and tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

pub struct CircuitBreaker {
    state: RwLock<CircuitState>,
    failure_count: AtomicU32,
    failure_threshold: u32,
    cooldown: Duration,
    opened_at: RwLock<Option<Instant>>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            state: RwLock::new(CircuitState::Closed),
            failure_count: AtomicU32::new(0),
            failure_threshold,
            cooldown,
            opened_at: RwLock::new(None),
        }
    }

    /// Whether a caller may attempt the guarded call right now. Transitions
    /// `Open -> HalfOpen` as a side effect once the cooldown has elapsed.
    pub async fn can_execute(&self) -> bool {
        match *self.state.read().await {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = self.opened_at.read().await.map(|t| t.elapsed());
                match elapsed {
                    Some(e) if e >= self.cooldown => {
                        *self.state.write().await = CircuitState::HalfOpen;
                        debug!("engine circuit breaker half-open, probing");
                        true
                    }
                    _ => false,
                }
            }
        }
    }

    pub async fn record_success(&self) {
        self.failure_count.store(0, Ordering::SeqCst);
        let mut state = self.state.write().await;
        if *state != CircuitState::Closed {
            *state = CircuitState::Closed;
            *self.opened_at.write().await = None;
            debug!("engine circuit breaker closed after successful probe");
        }
    }

    pub async fn record_failure(&self) {
        let count = self.failure_count.fetch_add(1, Ordering::SeqCst) + 1;
        if count < self.failure_threshold {
            return;
        }
        let mut state = self.state.write().await;
        if *state != CircuitState::Open {
            warn!(count, "engine circuit breaker opened");
            *state = CircuitState::Open;
            *self.opened_at.write().await = Some(Instant::now());
        }
    }

    pub async fn state(&self) -> CircuitState {
        *self.state.read().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn closed_allows_execution() {
        let breaker = CircuitBreaker::new(3, Duration::from_millis(50));
        assert!(breaker.can_execute().await);
    }

    #[tokio::test]
    async fn opens_after_threshold_consecutive_failures() {
        let breaker = CircuitBreaker::new(2, Duration::from_secs(60));
        breaker.record_failure().await;
        assert_eq!(breaker.state().await, CircuitState::Closed);
        breaker.record_failure().await;
        assert_eq!(breaker.state().await, CircuitState::Open);
    }

    #[tokio::test]
    async fn success_resets_failure_count() {
        let breaker = CircuitBreaker::new(2, Duration::from_secs(60));
        breaker.record_failure().await;
        breaker.record_success().await;
        breaker.record_failure().await;
        assert_eq!(breaker.state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn half_opens_after_cooldown_and_closes_on_success() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(10));
        breaker.record_failure().await;
        assert_eq!(breaker.state().await, CircuitState::Open);
        assert!(!breaker.can_execute().await);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(breaker.can_execute().await);
        assert_eq!(breaker.state().await, CircuitState::HalfOpen);

        breaker.record_success().await;
        assert_eq!(breaker.state().await, CircuitState::Closed);
    }
}
