//! Per-dependency circuit breaker (§4.9), ported from the original's
//! `CircuitBreaker` class: CLOSED/OPEN/HALF_OPEN, failure threshold, and a
//! recovery timeout after which a single probe call is allowed through.

use std::time::Duration;

use tokio::sync::Mutex;
use tracing::info;

use crate::clock::Clock;
use crate::error::EscrowError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    state: State,
    failure_count: u32,
    success_count: u32,
    opened_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Process-local state (§5: "no cross-instance coordination is required").
pub struct CircuitBreaker {
    name: &'static str,
    failure_threshold: u32,
    recovery_timeout: Duration,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: &'static str, failure_threshold: u32, recovery_timeout: Duration) -> Self {
        CircuitBreaker {
            name,
            failure_threshold,
            recovery_timeout,
            inner: Mutex::new(Inner {
                state: State::Closed,
                failure_count: 0,
                success_count: 0,
                opened_at: None,
            }),
        }
    }

    pub fn custody() -> Self {
        Self::new("custody", 5, Duration::from_secs(60))
    }

    pub fn audit_sink() -> Self {
        Self::new("audit_sink", 10, Duration::from_secs(30))
    }

    pub fn notification() -> Self {
        Self::new("notification", 3, Duration::from_secs(120))
    }

    /// Whether a call may proceed right now; transitions `OPEN -> HALF_OPEN`
    /// if the recovery timeout has elapsed.
    async fn allow(&self, clock: &dyn Clock) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.state {
            State::Closed | State::HalfOpen => true,
            State::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|opened_at| clock.now() - opened_at)
                    .unwrap_or_default();
                if elapsed >= chrono::Duration::from_std(self.recovery_timeout).unwrap() {
                    inner.state = State::HalfOpen;
                    info!(breaker = self.name, "circuit half-open, probing");
                    true
                } else {
                    false
                }
            }
        }
    }

    async fn on_success(&self) {
        let mut inner = self.inner.lock().await;
        match inner.state {
            State::Closed => {
                inner.failure_count = 0;
            }
            State::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= 2 {
                    inner.state = State::Closed;
                    inner.failure_count = 0;
                    inner.success_count = 0;
                    info!(breaker = self.name, "circuit closed after recovery");
                }
            }
            State::Open => {}
        }
    }

    async fn on_failure(&self, clock: &dyn Clock) {
        let mut inner = self.inner.lock().await;
        match inner.state {
            State::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.failure_threshold {
                    inner.state = State::Open;
                    inner.opened_at = Some(clock.now());
                    info!(breaker = self.name, "circuit opened");
                }
            }
            State::HalfOpen => {
                inner.state = State::Open;
                inner.opened_at = Some(clock.now());
                inner.success_count = 0;
                info!(breaker = self.name, "circuit re-opened after failed probe");
            }
            State::Open => {}
        }
    }

    /// Run `op` through the breaker: fail fast with `CircuitOpen` if
    /// tripped, else run it and record the outcome.
    pub async fn call<F, Fut, T>(&self, clock: &dyn Clock, op: F) -> Result<T, EscrowError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, EscrowError>>,
    {
        if !self.allow(clock).await {
            return Err(EscrowError::CircuitOpen {
                dependency: self.name,
                source: None,
            });
        }
        match op().await {
            Ok(value) => {
                self.on_success().await;
                Ok(value)
            }
            Err(err) => {
                self.on_failure(clock).await;
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::Utc;

    #[tokio::test]
    async fn opens_after_threshold_and_recovers() {
        let breaker = CircuitBreaker::new("test", 2, Duration::from_secs(60));
        let clock = FixedClock::new(Utc::now());

        for _ in 0..2 {
            let _ = breaker
                .call(&clock, || async { Err::<(), _>(EscrowError::Custody("x".into())) })
                .await;
        }

        let result = breaker.call(&clock, || async { Ok::<(), EscrowError>(()) }).await;
        assert!(matches!(result, Err(EscrowError::CircuitOpen { .. })));

        clock.advance(chrono::Duration::seconds(61));

        // First call after recovery timeout is a probe.
        breaker.call(&clock, || async { Ok::<(), EscrowError>(()) }).await.unwrap();
        breaker.call(&clock, || async { Ok::<(), EscrowError>(()) }).await.unwrap();

        // Two successes in HALF_OPEN close the circuit.
        for _ in 0..2 {
            let _ = breaker
                .call(&clock, || async { Err::<(), _>(EscrowError::Custody("x".into())) })
                .await;
        }
        let result = breaker.call(&clock, || async { Ok::<(), EscrowError>(()) }).await;
        assert!(matches!(result, Err(EscrowError::CircuitOpen { .. })));
    }
}
