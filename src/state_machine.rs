//! Transaction state machine (§4.1). Pure and synchronous: transitions are
//! validated against a fixed table and a set of guards evaluated against a
//! read-only snapshot; the caller persists the resulting state change and
//! audit event atomically.

use crate::domain::TransactionState::*;
use crate::domain::{Settlement, TaskStatus, TransactionState, VerificationTask};
use crate::error::{EscrowError, Result};

/// Everything a guard needs to know about the transaction's current
/// related rows, without giving the state machine store access.
pub struct TransitionContext<'a> {
    pub custody_id_set: bool,
    pub tasks: &'a [VerificationTask],
    pub settlement: Option<&'a Settlement>,
}

/// Whether `to` is reachable from `from` in one step, per the table in §4.1.
pub fn is_valid_transition(from: TransactionState, to: TransactionState) -> bool {
    matches!(
        (from, to),
        (Initiated, Funded)
            | (Initiated, Cancelled)
            | (Funded, VerificationInProgress)
            | (Funded, Cancelled)
            | (Funded, Disputed)
            | (VerificationInProgress, VerificationComplete)
            | (VerificationInProgress, Cancelled)
            | (VerificationInProgress, Disputed)
            | (VerificationComplete, SettlementPending)
            | (VerificationComplete, Disputed)
            | (SettlementPending, Settled)
            | (SettlementPending, Disputed)
            | (Disputed, VerificationInProgress)
            | (Disputed, SettlementPending)
            | (Disputed, Cancelled)
    )
}

/// The valid next states from `from`, for read-only inspection.
pub fn valid_targets(from: TransactionState) -> Vec<TransactionState> {
    [
        Initiated,
        Funded,
        VerificationInProgress,
        VerificationComplete,
        SettlementPending,
        Settled,
        Disputed,
        Cancelled,
    ]
    .into_iter()
    .filter(|&to| is_valid_transition(from, to))
    .collect()
}

fn guard(target: TransactionState, ctx: &TransitionContext<'_>) -> std::result::Result<(), String> {
    match target {
        Funded => Ok(()), // earnest-money deposit completion is checked by the caller before invoking transition
        VerificationInProgress => {
            if ctx.custody_id_set {
                Ok(())
            } else {
                Err("custody_id is not set".to_string())
            }
        }
        VerificationComplete => {
            if ctx.tasks.iter().all(|t| t.status == TaskStatus::Completed) {
                Ok(())
            } else {
                Err("not every task is COMPLETED".to_string())
            }
        }
        SettlementPending => {
            // Approval is checked by report status at the call site; the
            // state machine only knows about task completion here.
            if ctx.tasks.iter().all(|t| t.status == TaskStatus::Completed) {
                Ok(())
            } else {
                Err("not every task is COMPLETED".to_string())
            }
        }
        Settled => match ctx.settlement {
            Some(s) if s.external_tx_ref.as_deref().is_some_and(|r| !r.is_empty()) => Ok(()),
            _ => Err("no settlement with a non-empty external_tx_ref exists".to_string()),
        },
        Disputed => Ok(()), // terminality is checked by is_valid_transition
        Initiated | Cancelled => Ok(()),
    }
}

/// Validate and describe a transition; does not mutate anything. Returns
/// `InvalidTransition` if `to` is unreachable from `from`, `GuardFailed` if
/// the target's precondition does not hold.
pub fn validate_transition(
    from: TransactionState,
    to: TransactionState,
    ctx: &TransitionContext<'_>,
) -> Result<()> {
    if !is_valid_transition(from, to) {
        return Err(EscrowError::InvalidTransition {
            from: format!("{from:?}"),
            to: format!("{to:?}"),
        });
    }
    guard(to, ctx).map_err(|reason| EscrowError::GuardFailed {
        target: format!("{to:?}"),
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_ctx() -> TransitionContext<'static> {
        TransitionContext {
            custody_id_set: false,
            tasks: &[],
            settlement: None,
        }
    }

    #[test]
    fn initiated_to_funded_is_valid_with_no_guard() {
        assert!(validate_transition(Initiated, Funded, &empty_ctx()).is_ok());
    }

    #[test]
    fn verification_in_progress_requires_custody_id() {
        let ctx = empty_ctx();
        assert!(matches!(
            validate_transition(Funded, VerificationInProgress, &ctx),
            Err(EscrowError::GuardFailed { .. })
        ));
    }

    #[test]
    fn terminal_states_have_no_outgoing_transitions() {
        assert!(valid_targets(Settled).is_empty());
        assert!(valid_targets(Cancelled).is_empty());
    }

    #[test]
    fn settled_to_anything_is_invalid() {
        assert!(matches!(
            validate_transition(Settled, Cancelled, &empty_ctx()),
            Err(EscrowError::InvalidTransition { .. })
        ));
    }
}
