use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{TaskType, TransactionState};
use crate::id::{AuditEventId, DisputeId, PaymentId, TransactionId};

/// Tagged variant over the closed event-type enum (spec §9 redesign note):
/// each variant carries its own typed payload rather than an untyped blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventPayload {
    TransactionInitiated {
        buyer_agent_id: String,
        seller_agent_id: String,
        property_id: String,
        earnest_money: Decimal,
        total_purchase_price: Decimal,
    },
    EarnestMoneyDeposited {
        amount: Decimal,
        external_tx_ref: String,
    },
    VerificationTaskAssigned {
        task_type: TaskType,
        deadline: DateTime<Utc>,
    },
    VerificationCompleted {
        task_type: TaskType,
        approved: bool,
    },
    PaymentReleased {
        payment_id: PaymentId,
        amount: Decimal,
        external_tx_ref: String,
    },
    SettlementExecuted {
        seller_amount: Decimal,
        external_tx_ref: String,
    },
    TransactionCancelled {
        reason: String,
        refunded: bool,
    },
    DisputeRaised {
        dispute_id: DisputeId,
        previous_state: TransactionState,
    },
    DisputeResolved {
        dispute_id: DisputeId,
        resolution: String,
    },
    StateChanged {
        from: TransactionState,
        to: TransactionState,
    },
}

impl EventPayload {
    pub fn event_type(&self) -> EventType {
        match self {
            EventPayload::TransactionInitiated { .. } => EventType::TransactionInitiated,
            EventPayload::EarnestMoneyDeposited { .. } => EventType::EarnestMoneyDeposited,
            EventPayload::VerificationTaskAssigned { .. } => EventType::VerificationTaskAssigned,
            EventPayload::VerificationCompleted { .. } => EventType::VerificationCompleted,
            EventPayload::PaymentReleased { .. } => EventType::PaymentReleased,
            EventPayload::SettlementExecuted { .. } => EventType::SettlementExecuted,
            EventPayload::TransactionCancelled { .. } => EventType::TransactionCancelled,
            EventPayload::DisputeRaised { .. } => EventType::DisputeRaised,
            EventPayload::DisputeResolved { .. } => EventType::DisputeResolved,
            EventPayload::StateChanged { .. } => EventType::StateChanged,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    TransactionInitiated,
    EarnestMoneyDeposited,
    VerificationTaskAssigned,
    VerificationCompleted,
    PaymentReleased,
    SettlementExecuted,
    TransactionCancelled,
    DisputeRaised,
    DisputeResolved,
    StateChanged,
}

/// An immutable fact. Append-only; no updates or deletes; insertion order
/// per `transaction_id` is preserved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: AuditEventId,
    pub transaction_id: TransactionId,
    pub payload: EventPayload,
    pub external_tx_ref: Option<String>,
    pub block_number: Option<u64>,
    pub timestamp: DateTime<Utc>,
    /// True until the external immutability sink has acknowledged this
    /// event; reconciled by a background worker (§4.8).
    pub pending: bool,
    /// sha256 of the canonical CBOR encoding of this event's identity and
    /// payload (§2, §4.8) — the content-addressing guarantee the audit log
    /// is responsible for.
    pub content_hash: String,
}
