use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::Dispute;
use crate::id::{AccountId, TransactionId};

/// Lifecycle states from the transaction state machine (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionState {
    Initiated,
    Funded,
    VerificationInProgress,
    VerificationComplete,
    SettlementPending,
    Settled,
    Disputed,
    Cancelled,
}

impl TransactionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TransactionState::Settled | TransactionState::Cancelled)
    }
}

/// The hub entity. Owns its tasks, payments, settlement, and audit events;
/// nothing outside the store may mutate state or money-bearing fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub buyer_agent_id: String,
    pub seller_agent_id: String,
    pub property_id: String,
    pub earnest_money: Decimal,
    pub total_purchase_price: Decimal,
    pub state: TransactionState,
    pub custody_id: Option<AccountId>,
    pub initiated_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub target_closing_date: DateTime<Utc>,
    pub actual_closing_date: Option<DateTime<Utc>>,
    pub metadata: serde_json::Value,
    pub disputes: Vec<Dispute>,
}

impl Transaction {
    pub fn open_disputes(&self) -> impl Iterator<Item = &Dispute> {
        self.disputes
            .iter()
            .filter(|d| d.status == super::DisputeStatus::Open)
    }
}
