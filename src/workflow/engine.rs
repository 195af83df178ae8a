//! Workflow engine (§4.3): creates workflows, executes the executable
//! frontier through registered per-type handlers with automatic retry, and
//! accepts externally produced reports. Ported from the original's
//! `WorkflowEngine.execute_task`/`handle_task_completion`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::clock::Clock;
use crate::domain::{TaskStatus, TaskType, VerificationReport, VerificationTask};
use crate::error::Result;
use crate::id::{TaskId, TransactionId};
use crate::resilience::RetryPolicy;
use crate::store::Store;
use crate::workflow::dag::{self, TaskDefinition};

/// A handler performing the real-world verification work for one task
/// type. Returns the submitted report, or an error the engine treats as a
/// retryable failure of that attempt.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn execute(&self, task: &VerificationTask) -> anyhow::Result<VerificationReport>;
}

pub type CompletionCallback = Arc<dyn Fn(&TransactionId) + Send + Sync>;

pub struct WorkflowEngine<S: Store> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    handlers: HashMap<TaskType, Arc<dyn TaskHandler>>,
    completion_callbacks: Vec<CompletionCallback>,
    /// The dedicated engine-level retry policy (same shape as the *payment*
    /// policy, kept as its own named instance per §4.3 — see DESIGN.md).
    retry_policy: RetryPolicy,
}

impl<S: Store> WorkflowEngine<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        WorkflowEngine {
            store,
            clock,
            handlers: HashMap::new(),
            completion_callbacks: Vec::new(),
            retry_policy: RetryPolicy::PAYMENT,
        }
    }

    pub fn register_task_handler(&mut self, task_type: TaskType, handler: Arc<dyn TaskHandler>) {
        self.handlers.insert(task_type, handler);
    }

    pub fn register_completion_callback(&mut self, callback: CompletionCallback) {
        self.completion_callbacks.push(callback);
    }

    /// Materialize tasks in the store for a transaction's workflow,
    /// computing deadlines once from `base_date` and never shifting them.
    pub async fn create_workflow(
        &self,
        transaction_id: &TransactionId,
        defs: &[TaskDefinition],
        assigned_agent_ids: &HashMap<TaskType, String>,
        base_date: DateTime<Utc>,
    ) -> Result<Vec<VerificationTask>> {
        dag::validate_dag(defs).map_err(|e| {
            crate::error::EscrowError::Validation(format!("invalid workflow DAG: {e}"))
        })?;
        let deadlines = dag::compute_deadlines(defs, base_date);

        let mut tasks = Vec::with_capacity(defs.len());
        for def in defs {
            let task = VerificationTask {
                id: TaskId::new().map_err(crate::error::EscrowError::Other)?,
                transaction_id: transaction_id.clone(),
                r#type: def.r#type,
                assigned_agent_id: assigned_agent_ids
                    .get(&def.r#type)
                    .cloned()
                    .unwrap_or_default(),
                status: TaskStatus::Assigned,
                deadline: deadlines[&def.r#type],
                payment_amount: def.payment_amount,
                report_id: None,
                assigned_at: base_date,
                completed_at: None,
            };
            self.store.put_task(task.clone()).await?;
            tasks.push(task);
        }
        Ok(tasks)
    }

    /// Execute every executable task in the frontier that has a registered
    /// handler; tasks with no handler are left `ASSIGNED` for external
    /// agents to drive (Open Question #1 — both paths are supported).
    pub async fn execute_frontier(
        &self,
        transaction_id: &TransactionId,
        defs: &[TaskDefinition],
    ) -> Result<()> {
        let tasks = self.store.list_tasks(transaction_id).await?;
        let frontier: Vec<TaskId> = dag::executable_frontier(&tasks, defs)
            .into_iter()
            .map(|t| t.id.clone())
            .collect();

        for task_id in frontier {
            let task = self.store.get_task(&task_id).await?;
            let Some(handler) = self.handlers.get(&task.r#type).cloned() else {
                continue;
            };
            self.execute_task(task, handler).await?;
        }
        Ok(())
    }

    /// Run `task` through `handler`, retrying up to `max_attempts` times
    /// with exponential backoff; on exhaustion the task becomes `FAILED`.
    async fn execute_task(&self, mut task: VerificationTask, handler: Arc<dyn TaskHandler>) -> Result<()> {
        task.status = TaskStatus::InProgress;
        self.store.put_task(task.clone()).await?;

        let mut attempt = 1;
        loop {
            match handler.execute(&task).await {
                Ok(report) => {
                    self.store.put_report(report.clone()).await?;
                    task.report_id = Some(report.id.clone());
                    task.status = TaskStatus::Completed;
                    task.completed_at = Some(self.clock.now());
                    self.store.put_task(task).await?;
                    return Ok(());
                }
                Err(err) if attempt < self.retry_policy.max_attempts => {
                    warn!(task_id = %task.id, attempt, %err, "task handler failed, retrying");
                    tokio::time::sleep(self.retry_policy.delay_for_attempt(attempt)).await;
                    attempt += 1;
                }
                Err(err) => {
                    warn!(task_id = %task.id, %err, "task handler exhausted retries, marking FAILED");
                    task.status = TaskStatus::Failed;
                    self.store.put_task(task).await?;
                    return Ok(());
                }
            }
        }
    }

    /// Accept a submitted report (possibly externally produced): link it to
    /// its task, mark the task `COMPLETED`, and return whether the whole
    /// workflow is now complete so the caller can trigger completion
    /// callbacks and the `VERIFICATION_COMPLETE` transition.
    pub async fn handle_task_completion(
        &self,
        transaction_id: &TransactionId,
        task_type: TaskType,
        report: VerificationReport,
    ) -> Result<bool> {
        let tasks = self.store.list_tasks(transaction_id).await?;
        let mut task = tasks
            .into_iter()
            .find(|t| t.r#type == task_type)
            .ok_or_else(|| crate::error::EscrowError::not_found("task", format!("{task_type:?}")))?;

        self.store.put_report(report.clone()).await?;
        task.report_id = Some(report.id.clone());
        task.status = TaskStatus::Completed;
        task.completed_at = Some(self.clock.now());
        self.store.put_task(task).await?;

        let tasks = self.store.list_tasks(transaction_id).await?;
        let complete = dag::is_workflow_complete(&tasks);
        if complete {
            info!(transaction_id = %transaction_id, "workflow complete, triggering callbacks");
            for callback in &self.completion_callbacks {
                callback(transaction_id);
            }
        }
        Ok(complete)
    }

    pub async fn check_deadlines(&self, transaction_id: &TransactionId) -> Result<Vec<VerificationTask>> {
        let tasks = self.store.list_tasks(transaction_id).await?;
        let now = self.clock.now();
        Ok(dag::overdue_tasks(&tasks, now).into_iter().cloned().collect())
    }
}
