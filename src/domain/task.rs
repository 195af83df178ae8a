use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::id::{ReportId, TaskId, TransactionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    TitleSearch,
    Inspection,
    Appraisal,
    Lending,
}

impl TaskType {
    pub const ALL: [TaskType; 4] = [
        TaskType::TitleSearch,
        TaskType::Inspection,
        TaskType::Appraisal,
        TaskType::Lending,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Assigned,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

/// A unit of verification work. `(transaction_id, type)` is unique; status
/// only ever moves `ASSIGNED -> IN_PROGRESS -> COMPLETED|FAILED`, or to the
/// terminal `CANCELLED` from any non-terminal status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationTask {
    pub id: TaskId,
    pub transaction_id: TransactionId,
    pub r#type: TaskType,
    pub assigned_agent_id: String,
    pub status: TaskStatus,
    pub deadline: DateTime<Utc>,
    pub payment_amount: Decimal,
    pub report_id: Option<ReportId>,
    pub assigned_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl VerificationTask {
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status != TaskStatus::Completed && now > self.deadline
    }

    pub fn escalation_required(&self, now: DateTime<Utc>) -> bool {
        self.is_overdue(now) && (now - self.deadline) > chrono::Duration::days(2)
    }
}
