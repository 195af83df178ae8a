use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::TaskType;
use crate::id::{ReportId, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportStatus {
    Approved,
    Rejected,
    NeedsReview,
}

/// A report submitted against a task. Immutable once `reviewed_at` is set;
/// a task has at most one active report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    pub id: ReportId,
    pub task_id: TaskId,
    pub agent_id: String,
    pub r#type: TaskType,
    pub status: ReportStatus,
    pub findings: serde_json::Value,
    pub documents: Vec<String>,
    pub submitted_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewer_notes: Option<String>,
}
