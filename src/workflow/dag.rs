//! Verification workflow DAG (§4.2): default topology, per-type defaults,
//! cycle detection, deadline computation, executable frontier, and overdue
//! detection. Ported from the original's `VerificationWorkflow` class.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::domain::{TaskStatus, TaskType, VerificationTask};
use crate::error::{EscrowError, Result};

#[derive(Debug, Clone)]
pub struct TaskDefinition {
    pub r#type: TaskType,
    pub depends_on: Vec<TaskType>,
    pub deadline_days: i64,
    pub payment_amount: Decimal,
}

/// `TITLE_SEARCH` and `INSPECTION -> APPRAISAL` both feed `LENDING`; the
/// default topology from §4.2's diagram.
pub fn default_tasks() -> Vec<TaskDefinition> {
    vec![
        TaskDefinition {
            r#type: TaskType::TitleSearch,
            depends_on: vec![],
            deadline_days: 5,
            payment_amount: dec!(1200.00),
        },
        TaskDefinition {
            r#type: TaskType::Inspection,
            depends_on: vec![],
            deadline_days: 7,
            payment_amount: dec!(500.00),
        },
        TaskDefinition {
            r#type: TaskType::Appraisal,
            depends_on: vec![TaskType::Inspection],
            deadline_days: 5,
            payment_amount: dec!(400.00),
        },
        TaskDefinition {
            r#type: TaskType::Lending,
            depends_on: vec![TaskType::TitleSearch, TaskType::Appraisal],
            deadline_days: 10,
            payment_amount: dec!(0.00),
        },
    ]
}

/// Detect cycles with DFS using a recursion-stack marker (§4.2); fails with
/// `Validation` if any task reaches itself.
pub fn validate_dag(tasks: &[TaskDefinition]) -> Result<()> {
    let by_type: HashMap<TaskType, &TaskDefinition> =
        tasks.iter().map(|t| (t.r#type, t)).collect();

    let mut visited = HashSet::new();
    let mut rec_stack = HashSet::new();

    fn visit(
        node: TaskType,
        by_type: &HashMap<TaskType, &TaskDefinition>,
        visited: &mut HashSet<TaskType>,
        rec_stack: &mut HashSet<TaskType>,
    ) -> Result<()> {
        if rec_stack.contains(&node) {
            return Err(EscrowError::Validation(format!(
                "circular dependency detected at {node:?}"
            )));
        }
        if visited.contains(&node) {
            return Ok(());
        }
        visited.insert(node);
        rec_stack.insert(node);
        if let Some(def) = by_type.get(&node) {
            for &dep in &def.depends_on {
                visit(dep, by_type, visited, rec_stack)?;
            }
        }
        rec_stack.remove(&node);
        Ok(())
    }

    for t in tasks {
        visit(t.r#type, &by_type, &mut visited, &mut rec_stack)?;
    }
    Ok(())
}

/// `deadline(T) = max(deadline(d) for d in deps(T)) + T.deadline_days`,
/// base-dated from `base_date` when `T` has no dependencies. Computed once,
/// memoized, and never shifted afterward.
pub fn compute_deadlines(
    tasks: &[TaskDefinition],
    base_date: DateTime<Utc>,
) -> HashMap<TaskType, DateTime<Utc>> {
    let by_type: HashMap<TaskType, &TaskDefinition> =
        tasks.iter().map(|t| (t.r#type, t)).collect();
    let mut cache = HashMap::new();

    fn deadline_of(
        node: TaskType,
        by_type: &HashMap<TaskType, &TaskDefinition>,
        base_date: DateTime<Utc>,
        cache: &mut HashMap<TaskType, DateTime<Utc>>,
    ) -> DateTime<Utc> {
        if let Some(&d) = cache.get(&node) {
            return d;
        }
        let def = by_type[&node];
        let base = if def.depends_on.is_empty() {
            base_date
        } else {
            def.depends_on
                .iter()
                .map(|&dep| deadline_of(dep, by_type, base_date, cache))
                .max()
                .unwrap()
        };
        let deadline = base + chrono::Duration::days(def.deadline_days);
        cache.insert(node, deadline);
        deadline
    }

    for t in tasks {
        deadline_of(t.r#type, &by_type, base_date, &mut cache);
    }
    cache
}

/// A task is executable iff its status is `ASSIGNED` and every dependency's
/// status is `COMPLETED`.
pub fn executable_frontier<'a>(
    tasks: &'a [VerificationTask],
    defs: &[TaskDefinition],
) -> Vec<&'a VerificationTask> {
    let by_type: HashMap<TaskType, &TaskDefinition> =
        defs.iter().map(|d| (d.r#type, d)).collect();
    let status_by_type: HashMap<TaskType, TaskStatus> =
        tasks.iter().map(|t| (t.r#type, t.status)).collect();

    tasks
        .iter()
        .filter(|t| {
            t.status == TaskStatus::Assigned
                && by_type
                    .get(&t.r#type)
                    .map(|def| {
                        def.depends_on
                            .iter()
                            .all(|dep| status_by_type.get(dep) == Some(&TaskStatus::Completed))
                    })
                    .unwrap_or(true)
        })
        .collect()
}

pub fn is_workflow_complete(tasks: &[VerificationTask]) -> bool {
    !tasks.is_empty() && tasks.iter().all(|t| t.status == TaskStatus::Completed)
}

/// Tasks overdue at `now`, alongside whether they have breached the
/// two-day escalation window.
pub fn overdue_tasks(tasks: &[VerificationTask], now: DateTime<Utc>) -> Vec<&VerificationTask> {
    tasks.iter().filter(|t| t.is_overdue(now)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_topology_is_acyclic() {
        validate_dag(&default_tasks()).unwrap();
    }

    #[test]
    fn cyclic_definitions_are_rejected() {
        let tasks = vec![
            TaskDefinition {
                r#type: TaskType::TitleSearch,
                depends_on: vec![TaskType::Lending],
                deadline_days: 1,
                payment_amount: dec!(0),
            },
            TaskDefinition {
                r#type: TaskType::Lending,
                depends_on: vec![TaskType::TitleSearch],
                deadline_days: 1,
                payment_amount: dec!(0),
            },
        ];
        assert!(validate_dag(&tasks).is_err());
    }

    #[test]
    fn deadlines_respect_dependency_order() {
        let base = Utc::now();
        let deadlines = compute_deadlines(&default_tasks(), base);
        assert!(deadlines[&TaskType::Appraisal] >= deadlines[&TaskType::Inspection]);
        assert!(deadlines[&TaskType::Lending] >= deadlines[&TaskType::TitleSearch]);
        assert!(deadlines[&TaskType::Lending] >= deadlines[&TaskType::Appraisal]);
    }
}
