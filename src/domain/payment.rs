use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::id::{AccountId, PaymentId, TransactionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentType {
    EarnestMoney,
    Verification,
    Commission,
    ClosingCost,
    Settlement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

/// A single money movement initiated by the orchestrator. The sum of
/// `COMPLETED` payments of type `VERIFICATION|COMMISSION|CLOSING_COST|
/// SETTLEMENT` must never exceed the sum of `COMPLETED` deposits — money is
/// never created inside the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub transaction_id: TransactionId,
    pub custody_id: AccountId,
    pub r#type: PaymentType,
    pub recipient_id: String,
    pub amount: Decimal,
    pub status: PaymentStatus,
    pub external_tx_ref: Option<String>,
    pub initiated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}
