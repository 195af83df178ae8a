//! End-to-end orchestrator scenarios (spec §8).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal_macros::dec;

use escrow_orchestrator::audit::{ExternalAuditSink, InMemorySink};
use escrow_orchestrator::clock::SystemClock;
use escrow_orchestrator::custody::InMemoryCustodyAdapter;
use escrow_orchestrator::domain::{AuditEvent, DisputeType, ReportStatus, Resolution, TaskType, TransactionState, VerificationReport};
use escrow_orchestrator::error::{EscrowError, Result};
use escrow_orchestrator::id::{ReportId, TaskId};
use escrow_orchestrator::orchestrator::Orchestrator;
use escrow_orchestrator::resilience::BreakerRegistry;
use escrow_orchestrator::settlement::SettlementParams;
use escrow_orchestrator::store::MemoryStore;

type TestOrchestrator = Orchestrator<MemoryStore, InMemoryCustodyAdapter>;

fn new_orchestrator() -> TestOrchestrator {
    Orchestrator::new(
        MemoryStore::new(),
        Arc::new(InMemoryCustodyAdapter::new(b"webhook-secret".to_vec())),
        Arc::new(InMemorySink::new()),
        Arc::new(SystemClock),
        BreakerRegistry::new(),
    )
}

/// A sink that never acknowledges, to exercise §4.8's "must be reconciled
/// before leaving SETTLEMENT_PENDING" gate.
struct NeverAcksSink;

#[async_trait]
impl ExternalAuditSink for NeverAcksSink {
    async fn record(&self, _event: &AuditEvent) -> Result<(String, Option<u64>)> {
        Err(EscrowError::AuditSink("sink permanently unreachable".to_string()))
    }
}

fn approved_report(task_id: &TaskId, r#type: TaskType) -> VerificationReport {
    VerificationReport {
        id: ReportId::new().unwrap(),
        task_id: task_id.clone(),
        agent_id: "agent-1".to_string(),
        r#type,
        status: ReportStatus::Approved,
        findings: serde_json::json!({}),
        documents: vec![],
        submitted_at: Utc::now(),
        reviewed_at: Some(Utc::now()),
        reviewer_notes: None,
    }
}

fn rejected_report(task_id: &TaskId, r#type: TaskType) -> VerificationReport {
    let mut report = approved_report(task_id, r#type);
    report.status = ReportStatus::Rejected;
    report
}

async fn initiate_and_fund(orchestrator: &TestOrchestrator) -> escrow_orchestrator::domain::Transaction {
    orchestrator
        .initiate(
            "buyer-agent".to_string(),
            "seller-agent".to_string(),
            "property-1".to_string(),
            dec!(10000.00),
            dec!(385000.00),
            Utc::now() + chrono::Duration::days(30),
            serde_json::json!({}),
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn happy_path_reaches_settled_with_expected_payments_and_seller_amount() {
    let orchestrator = new_orchestrator();
    let transaction = initiate_and_fund(&orchestrator).await;
    assert_eq!(transaction.state, TransactionState::Funded);

    let tasks = orchestrator
        .create_verification_workflow(&transaction.id, vec![], HashMap::new())
        .await
        .unwrap();
    assert_eq!(tasks.len(), 4);

    let view = orchestrator.get_transaction_view(&transaction.id).await.unwrap();
    assert_eq!(view.transaction.state, TransactionState::VerificationInProgress);

    for task_type in [
        TaskType::TitleSearch,
        TaskType::Inspection,
        TaskType::Appraisal,
        TaskType::Lending,
    ] {
        let tasks = orchestrator.get_transaction_view(&transaction.id).await.unwrap().tasks;
        let task = tasks.iter().find(|t| t.r#type == task_type).unwrap();
        orchestrator
            .process_verification_completion(&transaction.id, task_type, approved_report(&task.id, task_type))
            .await
            .unwrap();
    }

    let view = orchestrator.get_transaction_view(&transaction.id).await.unwrap();
    assert_eq!(view.transaction.state, TransactionState::SettlementPending);

    let mut released: Vec<_> = view
        .payments
        .iter()
        .map(|p| p.amount)
        .filter(|a| *a > dec!(0))
        .collect();
    released.sort();
    assert_eq!(released, vec![dec!(400.00), dec!(500.00), dec!(1200.00)]);

    let params = SettlementParams {
        buyer_agent_rate: dec!(0.03),
        seller_agent_rate: dec!(0.03),
        closing_costs: None,
        additional_distributions: vec![],
    };
    let settlement = orchestrator.execute_settlement(&transaction.id, &params).await.unwrap();
    assert_eq!(settlement.seller_amount, dec!(355950.00));

    let view = orchestrator.get_transaction_view(&transaction.id).await.unwrap();
    assert_eq!(view.transaction.state, TransactionState::Settled);
    assert!(view.transaction.actual_closing_date.is_some());

    let trail = orchestrator.get_audit_trail(&transaction.id).await.unwrap();
    let mut timestamps: Vec<_> = trail.iter().map(|e| e.timestamp).collect();
    let sorted = {
        let mut s = timestamps.clone();
        s.sort();
        s
    };
    assert_eq!(timestamps, sorted, "audit events must be non-decreasing in insertion order");
    timestamps.clear();
}

#[tokio::test(start_paused = true)]
async fn settlement_is_refused_while_audit_events_remain_unreconciled() {
    let orchestrator: TestOrchestrator = Orchestrator::new(
        MemoryStore::new(),
        Arc::new(InMemoryCustodyAdapter::new(b"webhook-secret".to_vec())),
        Arc::new(NeverAcksSink),
        Arc::new(SystemClock),
        BreakerRegistry::new(),
    );
    let transaction = initiate_and_fund(&orchestrator).await;
    orchestrator
        .create_verification_workflow(&transaction.id, vec![], HashMap::new())
        .await
        .unwrap();

    for task_type in [
        TaskType::TitleSearch,
        TaskType::Inspection,
        TaskType::Appraisal,
        TaskType::Lending,
    ] {
        let tasks = orchestrator.get_transaction_view(&transaction.id).await.unwrap().tasks;
        let task = tasks.iter().find(|t| t.r#type == task_type).unwrap();
        orchestrator
            .process_verification_completion(&transaction.id, task_type, approved_report(&task.id, task_type))
            .await
            .unwrap();
    }

    let trail = orchestrator.get_audit_trail(&transaction.id).await.unwrap();
    assert!(trail.iter().any(|e| e.pending), "fixture sink never acks, so some rows must be pending");

    let params = SettlementParams {
        buyer_agent_rate: dec!(0.03),
        seller_agent_rate: dec!(0.03),
        closing_costs: None,
        additional_distributions: vec![],
    };
    let err = orchestrator.execute_settlement(&transaction.id, &params).await.unwrap_err();
    assert!(matches!(err, EscrowError::AuditSink(_)));

    let view = orchestrator.get_transaction_view(&transaction.id).await.unwrap();
    assert_eq!(view.transaction.state, TransactionState::SettlementPending);
}

#[tokio::test]
async fn rejected_title_report_blocks_settlement() {
    let orchestrator = new_orchestrator();
    let transaction = initiate_and_fund(&orchestrator).await;
    orchestrator
        .create_verification_workflow(&transaction.id, vec![], HashMap::new())
        .await
        .unwrap();

    let tasks = orchestrator.get_transaction_view(&transaction.id).await.unwrap().tasks;
    let title_task = tasks.iter().find(|t| t.r#type == TaskType::TitleSearch).unwrap();

    orchestrator
        .process_verification_completion(
            &transaction.id,
            TaskType::TitleSearch,
            rejected_report(&title_task.id, TaskType::TitleSearch),
        )
        .await
        .unwrap();

    let view = orchestrator.get_transaction_view(&transaction.id).await.unwrap();
    let title_task = view.tasks.iter().find(|t| t.r#type == TaskType::TitleSearch).unwrap();
    assert_eq!(title_task.status, escrow_orchestrator::domain::TaskStatus::Completed);
    assert!(view.payments.iter().all(|p| p.r#type != escrow_orchestrator::domain::PaymentType::Verification
        || p.recipient_id != title_task.assigned_agent_id));
    assert_eq!(view.transaction.state, TransactionState::VerificationInProgress);

    let params = SettlementParams {
        buyer_agent_rate: dec!(0.03),
        seller_agent_rate: dec!(0.03),
        closing_costs: None,
        additional_distributions: vec![],
    };
    let err = orchestrator.execute_settlement(&transaction.id, &params).await.unwrap_err();
    assert!(matches!(err, EscrowError::InvalidState { .. }));
}

#[tokio::test]
async fn payment_release_retries_then_succeeds_exactly_once() {
    let orchestrator = new_orchestrator();
    let transaction = initiate_and_fund(&orchestrator).await;
    orchestrator
        .create_verification_workflow(&transaction.id, vec![], HashMap::new())
        .await
        .unwrap();

    let tasks = orchestrator.get_transaction_view(&transaction.id).await.unwrap().tasks;
    let title_task = tasks.iter().find(|t| t.r#type == TaskType::TitleSearch).unwrap();

    orchestrator
        .process_verification_completion(
            &transaction.id,
            TaskType::TitleSearch,
            approved_report(&title_task.id, TaskType::TitleSearch),
        )
        .await
        .unwrap();

    let view = orchestrator.get_transaction_view(&transaction.id).await.unwrap();
    let completed_payments: Vec<_> = view
        .payments
        .iter()
        .filter(|p| p.status == escrow_orchestrator::domain::PaymentStatus::Completed)
        .collect();
    assert_eq!(completed_payments.len(), 1);
    assert_eq!(completed_payments[0].amount, dec!(1200.00));

    let trail = orchestrator.get_audit_trail(&transaction.id).await.unwrap();
    let released_events = trail
        .iter()
        .filter(|e| matches!(e.payload, escrow_orchestrator::domain::EventPayload::PaymentReleased { .. }))
        .count();
    assert_eq!(released_events, 1);
}

#[tokio::test]
async fn dispute_raised_during_verification_resumes_on_continue() {
    let orchestrator = new_orchestrator();
    let transaction = initiate_and_fund(&orchestrator).await;
    orchestrator
        .create_verification_workflow(&transaction.id, vec![], HashMap::new())
        .await
        .unwrap();

    let dispute = orchestrator
        .raise_dispute(
            &transaction.id,
            "buyer-agent".to_string(),
            DisputeType::Verification,
            "inspection report looks incomplete".to_string(),
            serde_json::json!({"note": "missing roof section"}),
        )
        .await
        .unwrap();

    let view = orchestrator.get_transaction_view(&transaction.id).await.unwrap();
    assert_eq!(view.transaction.state, TransactionState::Disputed);
    assert_eq!(dispute.previous_state, TransactionState::VerificationInProgress);

    let trail = orchestrator.get_audit_trail(&transaction.id).await.unwrap();
    assert!(trail.iter().any(|e| matches!(
        &e.payload,
        escrow_orchestrator::domain::EventPayload::DisputeRaised { previous_state, .. }
            if *previous_state == TransactionState::VerificationInProgress
    )));

    orchestrator
        .resolve_dispute(&transaction.id, &dispute.id, Resolution::Continue)
        .await
        .unwrap();

    let view = orchestrator.get_transaction_view(&transaction.id).await.unwrap();
    assert_eq!(view.transaction.state, TransactionState::VerificationInProgress);
    assert!(view.transaction.disputes.iter().all(|d| d.status == escrow_orchestrator::domain::DisputeStatus::Resolved));
}

#[tokio::test]
async fn overdue_task_past_escalation_window_is_flagged() {
    let orchestrator = new_orchestrator();
    let transaction = initiate_and_fund(&orchestrator).await;

    let overrides = vec![escrow_orchestrator::workflow::TaskDefinition {
        r#type: TaskType::TitleSearch,
        depends_on: vec![],
        deadline_days: 5,
        payment_amount: dec!(1200.00),
    }];

    // Backdate so the deadline (base + 5 days) already passed 3 days ago,
    // past the 2-day escalation window (§4.2).
    let eight_days_ago = Utc::now() - chrono::Duration::days(8);
    {
        let mut engine_lock = orchestrator;
        let tasks = engine_lock
            .engine_mut()
            .create_workflow(&transaction.id, &overrides, &HashMap::new(), eight_days_ago)
            .await
            .unwrap();
        assert_eq!(tasks.len(), 1);

        let overdue = engine_lock.check_deadlines(&transaction.id).await.unwrap();
        assert_eq!(overdue.len(), 1);
        assert!(overdue[0].escalation_required(Utc::now()));
    }
}

#[tokio::test]
async fn cancel_marks_pending_tasks_cancelled() {
    let orchestrator = new_orchestrator();
    let transaction = initiate_and_fund(&orchestrator).await;
    orchestrator
        .create_verification_workflow(&transaction.id, vec![], HashMap::new())
        .await
        .unwrap();

    orchestrator
        .cancel(&transaction.id, "buyer backed out".to_string(), true)
        .await
        .unwrap();

    let view = orchestrator.get_transaction_view(&transaction.id).await.unwrap();
    assert_eq!(view.transaction.state, TransactionState::Cancelled);
    assert!(view
        .tasks
        .iter()
        .all(|t| t.status == escrow_orchestrator::domain::TaskStatus::Cancelled));
}
