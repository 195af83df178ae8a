use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::TaskType;
use crate::domain::TransactionState;
use crate::id::DisputeId;
use crate::settlement::SettlementParams;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeType {
    Verification,
    Payment,
    Settlement,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeStatus {
    Open,
    Resolved,
}

/// Raised against a transaction; stored on it directly (§4.7 — the source
/// keeps these as JSON metadata on the transaction rather than a separate
/// entity, a detail this crate follows in spirit with a typed field instead
/// of a raw JSON blob, per the tagged-variant-over-closed-enum redesign).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dispute {
    pub id: DisputeId,
    pub raised_by: String,
    pub r#type: DisputeType,
    pub description: String,
    pub evidence: serde_json::Value,
    pub raised_at: DateTime<Utc>,
    pub status: DisputeStatus,
    pub previous_state: TransactionState,
    pub resolution: Option<Resolution>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Dispute {
    /// The resolution kinds offered for this dispute, mirroring the
    /// source's `_get_dispute_resolution_options`: `continue`/`cancel`
    /// always offered, `retry_verification` when the dispute concerns
    /// verification, `adjust_settlement` when it was raised while settlement
    /// was pending.
    pub fn available_resolution_kinds(&self) -> Vec<&'static str> {
        let mut kinds = vec!["continue", "cancel"];
        if self.r#type == DisputeType::Verification {
            kinds.push("retry_verification");
        }
        if self.previous_state == TransactionState::SettlementPending {
            kinds.push("adjust_settlement");
        }
        kinds
    }
}

/// The four resolution kinds from §4.7.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resolution {
    Continue,
    Cancel { refund_earnest_money: bool },
    RetryVerification { task_type: TaskType },
    AdjustSettlement { params: SettlementParams },
}

impl Resolution {
    pub fn label(&self) -> &'static str {
        match self {
            Resolution::Continue => "continue",
            Resolution::Cancel { .. } => "cancel",
            Resolution::RetryVerification { .. } => "retry_verification",
            Resolution::AdjustSettlement { .. } => "adjust_settlement",
        }
    }
}
