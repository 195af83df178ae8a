//! The orchestrator (§4.5): the top-level façade sequencing state
//! transitions, workflow progress, and fund movements; raises, routes, and
//! resolves disputes. Composes every other component via explicit
//! dependency injection (spec §9), grounded end-to-end in the original's
//! `agents/escrow_agent_orchestrator.py::EscrowAgentOrchestrator`.

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, instrument};

use crate::audit::{AuditLog, ExternalAuditSink};
use crate::cache::WorkflowCache;
use crate::clock::Clock;
use crate::custody::{CustodyAdapter, Milestone};
use crate::domain::{
    Dispute, DisputeStatus, DisputeType, EventPayload, Payment, PaymentStatus, PaymentType,
    Resolution, Settlement, TaskStatus, TaskType, Transaction, TransactionState,
    VerificationReport, VerificationTask,
};
use crate::error::{EscrowError, Result};
use crate::id::{DisputeId, MilestoneId, PaymentId, SettlementId, TransactionId};
use crate::resilience::BreakerRegistry;
use crate::settlement::{self, ClosingCostPolicy, ComputedSettlement, DefaultClosingCostPolicy, SettlementParams};
use crate::state_machine::{self, TransitionContext};
use crate::store::Store;
use crate::workflow::dag::TaskDefinition;
use crate::workflow::WorkflowEngine;

/// Composite read model for `transaction:{id}` (§4.10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionView {
    pub transaction: Transaction,
    pub tasks: Vec<VerificationTask>,
    pub payments: Vec<Payment>,
    pub settlement: Option<Settlement>,
}

/// Composite read model for `workflow:{transaction_id}` (§4.10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowView {
    pub tasks: Vec<VerificationTask>,
}

type Cache = WorkflowCache<TransactionView, VerificationReport, WorkflowView>;

pub struct Orchestrator<S: Store, C: CustodyAdapter> {
    store: Arc<S>,
    custody: Arc<C>,
    audit: AuditLog<S>,
    cache: Cache,
    clock: Arc<dyn Clock>,
    breakers: BreakerRegistry,
    engine: WorkflowEngine<S>,
    closing_cost_policy: Arc<dyn ClosingCostPolicy>,
    locks: AsyncMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl<S: Store, C: CustodyAdapter> Orchestrator<S, C> {
    pub fn new(
        store: Arc<S>,
        custody: Arc<C>,
        sink: Arc<dyn ExternalAuditSink>,
        clock: Arc<dyn Clock>,
        breakers: BreakerRegistry,
    ) -> Self {
        let engine = WorkflowEngine::new(Arc::clone(&store), Arc::clone(&clock));
        Orchestrator {
            audit: AuditLog::new(Arc::clone(&store), sink),
            custody,
            cache: WorkflowCache::new(),
            clock,
            breakers,
            engine,
            closing_cost_policy: Arc::new(DefaultClosingCostPolicy),
            locks: AsyncMutex::new(HashMap::new()),
            store,
        }
    }

    pub fn with_closing_cost_policy(mut self, policy: Arc<dyn ClosingCostPolicy>) -> Self {
        self.closing_cost_policy = policy;
        self
    }

    pub fn engine_mut(&mut self) -> &mut WorkflowEngine<S> {
        &mut self.engine
    }

    /// Acquire the per-transaction logical lock for the duration of one
    /// orchestrator operation (§4.3, §5).
    async fn lock_for(&self, id: &TransactionId) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(
            locks
                .entry(id.as_str().to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
        )
    }

    async fn transaction_view(&self, id: &TransactionId) -> Result<TransactionView> {
        if let Some(view) = self.cache.get_transaction_view(self.clock.as_ref(), id).await {
            return Ok(view);
        }
        let view = self.load_transaction_view(id).await?;
        self.cache
            .put_transaction_view(self.clock.as_ref(), id, view.clone())
            .await;
        Ok(view)
    }

    async fn load_transaction_view(&self, id: &TransactionId) -> Result<TransactionView> {
        let transaction = self.store.get_transaction(id).await?;
        let tasks = self.store.list_tasks(id).await?;
        let payments = self.store.list_payments(id).await?;
        let settlement = self.store.get_settlement(id).await?;
        Ok(TransactionView {
            transaction,
            tasks,
            payments,
            settlement,
        })
    }

    async fn workflow_view(&self, id: &TransactionId) -> Result<WorkflowView> {
        if let Some(view) = self.cache.get_workflow_view(self.clock.as_ref(), id).await {
            return Ok(view);
        }
        let view = WorkflowView {
            tasks: self.store.list_tasks(id).await?,
        };
        self.cache
            .put_workflow_view(self.clock.as_ref(), id, view.clone())
            .await;
        Ok(view)
    }

    async fn invalidate(&self, id: &TransactionId) {
        self.cache.invalidate_transaction(id).await;
    }

    async fn transition(
        &self,
        transaction: &mut Transaction,
        to: TransactionState,
    ) -> Result<()> {
        let tasks = self.store.list_tasks(&transaction.id).await?;
        let settlement = self.store.get_settlement(&transaction.id).await?;
        let ctx = TransitionContext {
            custody_id_set: transaction.custody_id.is_some(),
            tasks: &tasks,
            settlement: settlement.as_ref(),
        };
        state_machine::validate_transition(transaction.state, to, &ctx)?;
        let from = transaction.state;
        transaction.state = to;
        transaction.updated_at = self.clock.now();
        self.store.put_transaction(transaction.clone()).await?;
        self.audit
            .record(
                &transaction.id,
                EventPayload::StateChanged { from, to },
                self.clock.as_ref(),
            )
            .await?;
        info!(transaction_id = %transaction.id, ?from, to = ?to, "state transition");
        Ok(())
    }

    // ---- initiate ----------------------------------------------------

    #[instrument(skip(self, metadata))]
    #[allow(clippy::too_many_arguments)]
    pub async fn initiate(
        &self,
        buyer_agent_id: String,
        seller_agent_id: String,
        property_id: String,
        earnest_money: Decimal,
        total_purchase_price: Decimal,
        target_closing_date: chrono::DateTime<chrono::Utc>,
        metadata: serde_json::Value,
    ) -> Result<Transaction> {
        if earnest_money <= Decimal::ZERO {
            return Err(EscrowError::validation("earnest_money must be > 0"));
        }
        if total_purchase_price < earnest_money {
            return Err(EscrowError::validation(
                "total_purchase_price must be >= earnest_money",
            ));
        }

        let now = self.clock.now();
        let mut transaction = Transaction {
            id: TransactionId::new().map_err(EscrowError::Other)?,
            buyer_agent_id,
            seller_agent_id,
            property_id,
            earnest_money,
            total_purchase_price,
            state: TransactionState::Initiated,
            custody_id: None,
            initiated_at: now,
            updated_at: now,
            target_closing_date,
            actual_closing_date: None,
            metadata,
            disputes: vec![],
        };
        self.store.put_transaction(transaction.clone()).await?;
        self.audit
            .record(
                &transaction.id,
                EventPayload::TransactionInitiated {
                    buyer_agent_id: transaction.buyer_agent_id.clone(),
                    seller_agent_id: transaction.seller_agent_id.clone(),
                    property_id: transaction.property_id.clone(),
                    earnest_money,
                    total_purchase_price,
                },
                self.clock.as_ref(),
            )
            .await?;

        let account = self
            .breakers
            .custody
            .call(self.clock.as_ref(), || {
                self.custody.create_account(&transaction.id, earnest_money)
            })
            .await
            .map_err(wrap_custody)?;
        transaction.custody_id = Some(account.id);

        self.audit
            .record(
                &transaction.id,
                EventPayload::EarnestMoneyDeposited {
                    amount: earnest_money,
                    external_tx_ref: format!("deposit:{}", transaction.id),
                },
                self.clock.as_ref(),
            )
            .await?;

        self.transition(&mut transaction, TransactionState::Funded).await?;
        self.invalidate(&transaction.id).await;
        Ok(transaction)
    }

    // ---- createVerificationWorkflow -----------------------------------

    #[instrument(skip(self, overrides))]
    pub async fn create_verification_workflow(
        &self,
        transaction_id: &TransactionId,
        overrides: Vec<TaskDefinition>,
        assigned_agent_ids: HashMap<TaskType, String>,
    ) -> Result<Vec<VerificationTask>> {
        let lock = self.lock_for(transaction_id).await;
        let _guard = lock.lock().await;

        let mut transaction = self.store.get_transaction(transaction_id).await?;

        let defs = if overrides.is_empty() {
            crate::workflow::dag::default_tasks()
        } else {
            overrides
        };

        let tasks = self
            .engine
            .create_workflow(transaction_id, &defs, &assigned_agent_ids, self.clock.now())
            .await?;

        let account_id = transaction
            .custody_id
            .clone()
            .ok_or_else(|| EscrowError::InvalidState {
                expected: "custody_id set".to_string(),
                found: "none".to_string(),
            })?;

        let milestones = tasks
            .iter()
            .map(|t| {
                Ok(Milestone {
                    id: MilestoneId::new().map_err(EscrowError::Other)?,
                    amount: t.payment_amount,
                    recipient: t.assigned_agent_id.clone(),
                    conditions: serde_json::json!({ "task_id": t.id.as_str() }),
                    auto_release: false,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        self.breakers
            .custody
            .call(self.clock.as_ref(), || {
                self.custody.configure_milestones(&account_id, milestones)
            })
            .await
            .map_err(wrap_custody)?;

        for task in &tasks {
            self.audit
                .record(
                    transaction_id,
                    EventPayload::VerificationTaskAssigned {
                        task_type: task.r#type,
                        deadline: task.deadline,
                    },
                    self.clock.as_ref(),
                )
                .await?;
        }

        self.transition(&mut transaction, TransactionState::VerificationInProgress)
            .await?;
        self.invalidate(transaction_id).await;
        Ok(tasks)
    }

    // ---- processVerificationCompletion --------------------------------

    #[instrument(skip(self, report))]
    pub async fn process_verification_completion(
        &self,
        transaction_id: &TransactionId,
        task_type: TaskType,
        report: VerificationReport,
    ) -> Result<()> {
        let lock = self.lock_for(transaction_id).await;
        let _guard = lock.lock().await;

        let mut transaction = self.store.get_transaction(transaction_id).await?;
        let approved = report.status == crate::domain::ReportStatus::Approved;

        let complete = self
            .engine
            .handle_task_completion(transaction_id, task_type, report.clone())
            .await?;

        self.audit
            .record(
                transaction_id,
                EventPayload::VerificationCompleted { task_type, approved },
                self.clock.as_ref(),
            )
            .await?;

        if approved {
            let task = self
                .store
                .list_tasks(transaction_id)
                .await?
                .into_iter()
                .find(|t| t.r#type == task_type)
                .expect("task just completed must exist");

            if task.payment_amount > Decimal::ZERO {
                // A payment failure here is non-fatal (§7): the task stays
                // COMPLETED and the payment is recorded FAILED for retry.
                match self.release_verification_payment(&transaction, &task).await {
                    Ok(()) => {}
                    Err(err) => {
                        tracing::warn!(%err, task_id = %task.id, "verification payment release failed, non-fatal");
                    }
                }
            }
        }

        if complete {
            let tasks = self.store.list_tasks(transaction_id).await?;
            let reports_approved = self.all_reports_approved(&tasks).await?;

            self.transition(&mut transaction, TransactionState::VerificationComplete)
                .await?;
            if reports_approved {
                // Collapsed with no observable intermediate state, per the
                // documented Open Question decision (DESIGN.md).
                self.transition(&mut transaction, TransactionState::SettlementPending)
                    .await?;
            }
        }

        self.invalidate(transaction_id).await;
        Ok(())
    }

    async fn all_reports_approved(&self, tasks: &[VerificationTask]) -> Result<bool> {
        for task in tasks {
            let Some(report_id) = &task.report_id else {
                return Ok(false);
            };
            let report = match self.cache.get_report(self.clock.as_ref(), report_id).await {
                Some(report) => report,
                None => {
                    let report = self.store.get_report(report_id).await?;
                    self.cache
                        .put_report(self.clock.as_ref(), report_id, report.clone())
                        .await;
                    report
                }
            };
            if report.status != crate::domain::ReportStatus::Approved {
                return Ok(false);
            }
        }
        Ok(true)
    }

    async fn release_verification_payment(
        &self,
        transaction: &Transaction,
        task: &VerificationTask,
    ) -> Result<()> {
        let account_id = transaction
            .custody_id
            .clone()
            .ok_or_else(|| EscrowError::InvalidState {
                expected: "custody_id set".to_string(),
                found: "none".to_string(),
            })?;
        let milestone_id = MilestoneId::parse(task.id.as_str());

        let mut payment = Payment {
            id: PaymentId::new().map_err(EscrowError::Other)?,
            transaction_id: transaction.id.clone(),
            custody_id: account_id.clone(),
            r#type: PaymentType::Verification,
            recipient_id: task.assigned_agent_id.clone(),
            amount: task.payment_amount,
            status: PaymentStatus::Pending,
            external_tx_ref: None,
            initiated_at: self.clock.now(),
            completed_at: None,
        };

        let receipt_result = crate::resilience::retry_with_backoff(
            &crate::resilience::RetryPolicy::PAYMENT,
            EscrowError::is_retryable,
            || {
                self.breakers.custody.call(self.clock.as_ref(), || {
                    self.custody.release_milestone(
                        &account_id,
                        &milestone_id,
                        &task.assigned_agent_id,
                        task.payment_amount,
                    )
                })
            },
        )
        .await;

        match receipt_result {
            Ok(receipt) => {
                payment.status = PaymentStatus::Completed;
                payment.external_tx_ref = Some(receipt.external_tx_ref.clone());
                payment.completed_at = Some(self.clock.now());
                self.store.put_payment(payment.clone()).await?;
                self.audit
                    .record(
                        &transaction.id,
                        EventPayload::PaymentReleased {
                            payment_id: payment.id.clone(),
                            amount: payment.amount,
                            external_tx_ref: receipt.external_tx_ref,
                        },
                        self.clock.as_ref(),
                    )
                    .await?;
                Ok(())
            }
            Err(err) => {
                payment.status = PaymentStatus::Failed;
                self.store.put_payment(payment).await?;
                Err(wrap_custody(err))
            }
        }
    }

    // ---- previewSettlement / executeSettlement ------------------------

    pub async fn preview_settlement(
        &self,
        transaction_id: &TransactionId,
        params: &SettlementParams,
    ) -> Result<ComputedSettlement> {
        let transaction = self.store.get_transaction(transaction_id).await?;
        let tasks = self.store.list_tasks(transaction_id).await?;
        settlement::compute_settlement(
            transaction.total_purchase_price,
            &tasks,
            params,
            self.closing_cost_policy.as_ref(),
        )
    }

    #[instrument(skip(self, params))]
    pub async fn execute_settlement(
        &self,
        transaction_id: &TransactionId,
        params: &SettlementParams,
    ) -> Result<Settlement> {
        let lock = self.lock_for(transaction_id).await;
        let _guard = lock.lock().await;

        let mut transaction = self.store.get_transaction(transaction_id).await?;
        if transaction.state != TransactionState::SettlementPending {
            return Err(EscrowError::InvalidState {
                expected: "SETTLEMENT_PENDING".to_string(),
                found: format!("{:?}", transaction.state),
            });
        }
        let tasks = self.store.list_tasks(transaction_id).await?;
        if !self.all_reports_approved(&tasks).await? {
            return Err(EscrowError::InvalidState {
                expected: "every report APPROVED".to_string(),
                found: "at least one report not approved".to_string(),
            });
        }

        // §4.8: a primary audit row without an external_tx_ref must be
        // reconciled before the transaction can leave SETTLEMENT_PENDING.
        // Give the background reconciler one more attempt, then refuse the
        // transition if anything is still unacknowledged.
        self.audit
            .reconcile_pending(transaction_id, &self.breakers.audit_sink, self.clock.as_ref())
            .await?;
        let still_pending = self.store.pending_audit_events(transaction_id).await?;
        if !still_pending.is_empty() {
            return Err(EscrowError::AuditSink(format!(
                "{} audit event(s) unreconciled; cannot leave SETTLEMENT_PENDING",
                still_pending.len()
            )));
        }

        let computed = settlement::compute_settlement(
            transaction.total_purchase_price,
            &tasks,
            params,
            self.closing_cost_policy.as_ref(),
        )?;

        let account_id = transaction
            .custody_id
            .clone()
            .ok_or_else(|| EscrowError::InvalidState {
                expected: "custody_id set".to_string(),
                found: "none".to_string(),
            })?;
        let settlement_key = format!("settlement:{transaction_id}");
        let distributions = computed
            .distributions
            .iter()
            .map(|d| crate::custody::Distribution {
                recipient: d.recipient.clone(),
                amount: d.amount,
            })
            .collect();

        let receipt = self
            .breakers
            .custody
            .call(self.clock.as_ref(), || {
                self.custody
                    .execute_settlement(&account_id, &settlement_key, distributions)
            })
            .await
            .map_err(wrap_custody)?;

        let settlement = Settlement {
            id: SettlementId::new().map_err(EscrowError::Other)?,
            transaction_id: transaction_id.clone(),
            total_amount: computed.total_amount,
            seller_amount: computed.seller_amount,
            buyer_agent_commission: computed.buyer_agent_commission,
            seller_agent_commission: computed.seller_agent_commission,
            closing_costs: computed.closing_costs,
            distributions: computed.distributions,
            external_tx_ref: Some(receipt.external_tx_ref.clone()),
            executed_at: self.clock.now(),
        };
        self.store.put_settlement(settlement.clone()).await?;

        self.audit
            .record(
                transaction_id,
                EventPayload::SettlementExecuted {
                    seller_amount: settlement.seller_amount,
                    external_tx_ref: receipt.external_tx_ref,
                },
                self.clock.as_ref(),
            )
            .await?;

        transaction.actual_closing_date = Some(self.clock.now());
        self.transition(&mut transaction, TransactionState::Settled).await?;
        self.invalidate(transaction_id).await;
        Ok(settlement)
    }

    // ---- cancel --------------------------------------------------------

    #[instrument(skip(self))]
    pub async fn cancel(
        &self,
        transaction_id: &TransactionId,
        reason: String,
        refund_earnest_money: bool,
    ) -> Result<()> {
        let lock = self.lock_for(transaction_id).await;
        let _guard = lock.lock().await;

        let mut transaction = self.store.get_transaction(transaction_id).await?;
        self.transition(&mut transaction, TransactionState::Cancelled).await?;

        for mut task in self.store.list_tasks(transaction_id).await? {
            if !matches!(task.status, TaskStatus::Completed | TaskStatus::Cancelled) {
                task.status = TaskStatus::Cancelled;
                self.store.put_task(task).await?;
            }
        }

        self.audit
            .record(
                transaction_id,
                EventPayload::TransactionCancelled {
                    reason,
                    refunded: refund_earnest_money,
                },
                self.clock.as_ref(),
            )
            .await?;

        self.invalidate(transaction_id).await;
        Ok(())
    }

    // ---- raiseDispute / resolveDispute ---------------------------------

    #[instrument(skip(self, evidence))]
    pub async fn raise_dispute(
        &self,
        transaction_id: &TransactionId,
        raised_by: String,
        dispute_type: DisputeType,
        description: String,
        evidence: serde_json::Value,
    ) -> Result<Dispute> {
        let lock = self.lock_for(transaction_id).await;
        let _guard = lock.lock().await;

        let mut transaction = self.store.get_transaction(transaction_id).await?;
        if transaction.state.is_terminal() {
            return Err(EscrowError::InvalidState {
                expected: "non-terminal".to_string(),
                found: format!("{:?}", transaction.state),
            });
        }

        let previous_state = transaction.state;
        let dispute = Dispute {
            id: DisputeId::new().map_err(EscrowError::Other)?,
            raised_by,
            r#type: dispute_type,
            description,
            evidence,
            raised_at: self.clock.now(),
            status: DisputeStatus::Open,
            previous_state,
            resolution: None,
            resolved_at: None,
        };
        transaction.disputes.push(dispute.clone());
        self.store.put_transaction(transaction.clone()).await?;

        self.transition(&mut transaction, TransactionState::Disputed).await?;
        self.audit
            .record(
                transaction_id,
                EventPayload::DisputeRaised {
                    dispute_id: dispute.id.clone(),
                    previous_state,
                },
                self.clock.as_ref(),
            )
            .await?;

        self.invalidate(transaction_id).await;
        Ok(dispute)
    }

    #[instrument(skip(self))]
    pub async fn resolve_dispute(
        &self,
        transaction_id: &TransactionId,
        dispute_id: &DisputeId,
        resolution: Resolution,
    ) -> Result<()> {
        let lock = self.lock_for(transaction_id).await;
        let _guard = lock.lock().await;

        let mut transaction = self.store.get_transaction(transaction_id).await?;
        let dispute_index = transaction
            .disputes
            .iter()
            .position(|d| &d.id == dispute_id && d.status == DisputeStatus::Open)
            .ok_or_else(|| EscrowError::not_found("open dispute", dispute_id.as_str()))?;
        let previous_state = transaction.disputes[dispute_index].previous_state;

        match &resolution {
            Resolution::Continue => {
                self.transition(&mut transaction, previous_state).await?;
            }
            Resolution::Cancel {
                refund_earnest_money,
            } => {
                self.cancel_locked(&mut transaction, "dispute resolved as cancellation".to_string(), *refund_earnest_money)
                    .await?;
            }
            Resolution::RetryVerification { task_type } => {
                let tasks = self.store.list_tasks(transaction_id).await?;
                if let Some(mut task) = tasks.into_iter().find(|t| t.r#type == *task_type) {
                    task.status = TaskStatus::Assigned;
                    task.completed_at = None;
                    task.report_id = None;
                    self.store.put_task(task).await?;
                }
                self.transition(&mut transaction, TransactionState::VerificationInProgress)
                    .await?;
            }
            Resolution::AdjustSettlement { .. } => {
                if previous_state != TransactionState::SettlementPending {
                    return Err(EscrowError::InvalidState {
                        expected: "previous_state == SETTLEMENT_PENDING".to_string(),
                        found: format!("{previous_state:?}"),
                    });
                }
                self.transition(&mut transaction, TransactionState::SettlementPending)
                    .await?;
            }
        }

        let mut transaction = self.store.get_transaction(transaction_id).await?;
        transaction.disputes[dispute_index].status = DisputeStatus::Resolved;
        transaction.disputes[dispute_index].resolution = Some(resolution_label(&resolution));
        transaction.disputes[dispute_index].resolved_at = Some(self.clock.now());
        self.store.put_transaction(transaction.clone()).await?;

        self.audit
            .record(
                transaction_id,
                EventPayload::DisputeResolved {
                    dispute_id: dispute_id.clone(),
                    resolution: resolution.label().to_string(),
                },
                self.clock.as_ref(),
            )
            .await?;

        self.invalidate(transaction_id).await;
        Ok(())
    }

    async fn cancel_locked(
        &self,
        transaction: &mut Transaction,
        reason: String,
        refund_earnest_money: bool,
    ) -> Result<()> {
        self.transition(transaction, TransactionState::Cancelled).await?;
        for mut task in self.store.list_tasks(&transaction.id).await? {
            if !matches!(task.status, TaskStatus::Completed | TaskStatus::Cancelled) {
                task.status = TaskStatus::Cancelled;
                self.store.put_task(task).await?;
            }
        }
        self.audit
            .record(
                &transaction.id,
                EventPayload::TransactionCancelled {
                    reason,
                    refunded: refund_earnest_money,
                },
                self.clock.as_ref(),
            )
            .await?;
        Ok(())
    }

    pub async fn get_transaction_view(&self, transaction_id: &TransactionId) -> Result<TransactionView> {
        self.transaction_view(transaction_id).await
    }

    pub async fn get_audit_trail(&self, transaction_id: &TransactionId) -> Result<Vec<crate::domain::AuditEvent>> {
        self.audit.get_audit_trail(transaction_id).await
    }

    pub async fn check_deadlines(&self, transaction_id: &TransactionId) -> Result<Vec<VerificationTask>> {
        let view = self.workflow_view(transaction_id).await?;
        let now = self.clock.now();
        Ok(crate::workflow::dag::overdue_tasks(&view.tasks, now)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Read-through `workflow:{id}` view (§4.10) for callers that only need
    /// task progress, not the full `TransactionView`.
    pub async fn get_workflow_view(&self, transaction_id: &TransactionId) -> Result<WorkflowView> {
        self.workflow_view(transaction_id).await
    }
}

fn resolution_label(resolution: &Resolution) -> Resolution {
    // The persisted resolution value on the dispute row mirrors what was
    // applied, including its details (not just the label).
    match resolution {
        Resolution::Continue => Resolution::Continue,
        Resolution::Cancel {
            refund_earnest_money,
        } => Resolution::Cancel {
            refund_earnest_money: *refund_earnest_money,
        },
        Resolution::RetryVerification { task_type } => Resolution::RetryVerification {
            task_type: *task_type,
        },
        Resolution::AdjustSettlement { params } => Resolution::AdjustSettlement {
            params: params.clone(),
        },
    }
}

fn wrap_custody(err: EscrowError) -> EscrowError {
    match err {
        EscrowError::CircuitOpen { .. } => err,
        other => EscrowError::Custody(other.to_string()),
    }
}
