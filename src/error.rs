//! Crate-wide error taxonomy.

use thiserror::Error;

/// A single closed taxonomy covering every failure kind named in the
/// error-handling design: validation, lookup, state-machine rejection,
/// arithmetic, and the three external dependencies (custody, audit sink,
/// notification), each capable of carrying the breaker's open state.
#[derive(Debug, Error)]
pub enum EscrowError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("guard failed for transition to {target}: {reason}")]
    GuardFailed { target: String, reason: String },

    #[error("invalid state for operation: expected {expected}, found {found}")]
    InvalidState { expected: String, found: String },

    #[error("arithmetic error: {0}")]
    Arithmetic(String),

    #[error("custody error: {0}")]
    Custody(String),

    #[error("audit sink error: {0}")]
    AuditSink(String),

    #[error("notification error: {0}")]
    Notification(String),

    #[error("circuit open for dependency {dependency}")]
    CircuitOpen {
        dependency: &'static str,
        #[source]
        source: Option<Box<EscrowError>>,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EscrowError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        EscrowError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        EscrowError::Validation(msg.into())
    }

    /// Whether this failure is recoverable by the resilience layer's retry
    /// policies (custody, audit-sink, notification calls). Validation,
    /// lookup, and state-machine errors are never retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EscrowError::Custody(_) | EscrowError::AuditSink(_) | EscrowError::Notification(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, EscrowError>;
