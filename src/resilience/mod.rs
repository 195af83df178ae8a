//! Resilience layer (§4.9): retry-with-backoff and per-dependency circuit
//! breakers wrapping custody, audit-sink, and notification calls.

pub mod circuit_breaker;
pub mod retry;

pub use circuit_breaker::CircuitBreaker;
pub use retry::{retry_with_backoff, RetryPolicy};

/// Three named breakers, injected at orchestrator construction (spec §9:
/// "construction must accept an injected registry so tests can reset it").
pub struct BreakerRegistry {
    pub custody: CircuitBreaker,
    pub audit_sink: CircuitBreaker,
    pub notification: CircuitBreaker,
}

impl BreakerRegistry {
    pub fn new() -> Self {
        BreakerRegistry {
            custody: CircuitBreaker::custody(),
            audit_sink: CircuitBreaker::audit_sink(),
            notification: CircuitBreaker::notification(),
        }
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
