//! Domain entities, one module per entity in the data model.
//!
//! Nothing outside the `store` module constructs or mutates these directly
//! once persisted — the arena-and-indices redesign: entities reference each
//! other only by [`crate::id::Id`], never by in-process pointer, so there is
//! no cyclic object graph to manage.

mod audit_event;
mod dispute;
mod payment;
mod report;
mod settlement;
mod task;
mod transaction;

pub use audit_event::{AuditEvent, EventPayload, EventType};
pub use dispute::{Dispute, DisputeStatus, DisputeType, Resolution};
pub use payment::{Payment, PaymentStatus, PaymentType};
pub use report::{ReportStatus, VerificationReport};
pub use settlement::{Distribution, Settlement};
pub use task::{TaskStatus, TaskType, VerificationTask};
pub use transaction::{Transaction, TransactionState};
