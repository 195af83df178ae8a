use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::id::{SettlementId, TransactionId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Distribution {
    pub recipient: String,
    pub amount: Decimal,
    pub description: String,
}

/// The final distribution record; one per transaction.
/// `seller_amount = total_purchase_price - (buyer_agent_commission +
/// seller_agent_commission + closing_costs)`, must be >= 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settlement {
    pub id: SettlementId,
    pub transaction_id: TransactionId,
    pub total_amount: Decimal,
    pub seller_amount: Decimal,
    pub buyer_agent_commission: Decimal,
    pub seller_agent_commission: Decimal,
    pub closing_costs: Decimal,
    pub distributions: Vec<Distribution>,
    pub external_tx_ref: Option<String>,
    pub executed_at: DateTime<Utc>,
}
