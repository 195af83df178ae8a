//! Workflow cache (§4.10): short-TTL read-through cache of hot read models,
//! invalidated on every write that changes a cached view. The cache is
//! advisory (§5) — never a source of truth.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::RwLock;

use crate::clock::Clock;
use crate::id::{ReportId, TransactionId};

const TRANSACTION_VIEW_TTL: Duration = Duration::from_secs(5 * 60);
const REPORT_TTL: Duration = Duration::from_secs(24 * 60 * 60);
const WORKFLOW_VIEW_TTL: Duration = Duration::from_secs(5 * 60);

struct Entry<T> {
    value: T,
    expires_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Default)]
struct Tables<T, Tv, W> {
    transaction_views: HashMap<String, Entry<T>>,
    reports: HashMap<String, Entry<Tv>>,
    workflow_views: HashMap<String, Entry<W>>,
}

/// Generic over the three view payload types so the cache module stays
/// agnostic of the orchestrator's concrete view structs.
pub struct WorkflowCache<TxView, ReportView, WorkflowView> {
    tables: RwLock<Tables<TxView, ReportView, WorkflowView>>,
}

impl<TxView: Clone, ReportView: Clone, WorkflowView: Clone>
    WorkflowCache<TxView, ReportView, WorkflowView>
{
    pub fn new() -> Self {
        WorkflowCache {
            tables: RwLock::new(Tables {
                transaction_views: HashMap::new(),
                reports: HashMap::new(),
                workflow_views: HashMap::new(),
            }),
        }
    }

    pub async fn get_transaction_view(
        &self,
        clock: &dyn Clock,
        id: &TransactionId,
    ) -> Option<TxView> {
        Self::get(&self.tables.read().await.transaction_views, clock, id.as_str())
    }

    pub async fn put_transaction_view(&self, clock: &dyn Clock, id: &TransactionId, value: TxView) {
        self.tables.write().await.transaction_views.insert(
            id.as_str().to_string(),
            Entry {
                value,
                expires_at: clock.now() + chrono::Duration::from_std(TRANSACTION_VIEW_TTL).unwrap(),
            },
        );
    }

    pub async fn invalidate_transaction_view(&self, id: &TransactionId) {
        self.tables.write().await.transaction_views.remove(id.as_str());
    }

    pub async fn get_report(&self, clock: &dyn Clock, id: &ReportId) -> Option<ReportView> {
        Self::get(&self.tables.read().await.reports, clock, id.as_str())
    }

    pub async fn put_report(&self, clock: &dyn Clock, id: &ReportId, value: ReportView) {
        self.tables.write().await.reports.insert(
            id.as_str().to_string(),
            Entry {
                value,
                expires_at: clock.now() + chrono::Duration::from_std(REPORT_TTL).unwrap(),
            },
        );
    }

    pub async fn get_workflow_view(
        &self,
        clock: &dyn Clock,
        transaction_id: &TransactionId,
    ) -> Option<WorkflowView> {
        Self::get(&self.tables.read().await.workflow_views, clock, transaction_id.as_str())
    }

    pub async fn put_workflow_view(
        &self,
        clock: &dyn Clock,
        transaction_id: &TransactionId,
        value: WorkflowView,
    ) {
        self.tables.write().await.workflow_views.insert(
            transaction_id.as_str().to_string(),
            Entry {
                value,
                expires_at: clock.now() + chrono::Duration::from_std(WORKFLOW_VIEW_TTL).unwrap(),
            },
        );
    }

    pub async fn invalidate_workflow_view(&self, transaction_id: &TransactionId) {
        self.tables
            .write()
            .await
            .workflow_views
            .remove(transaction_id.as_str());
    }

    /// Invalidate both views that any write touching a transaction's tasks,
    /// payments, settlement, or state must invalidate (§4.10).
    pub async fn invalidate_transaction(&self, id: &TransactionId) {
        self.invalidate_transaction_view(id).await;
        self.invalidate_workflow_view(id).await;
    }

    fn get<V: Clone>(
        table: &HashMap<String, Entry<V>>,
        clock: &dyn Clock,
        key: &str,
    ) -> Option<V> {
        table.get(key).and_then(|entry| {
            if entry.expires_at > clock.now() {
                Some(entry.value.clone())
            } else {
                None
            }
        })
    }
}

impl<TxView: Clone, ReportView: Clone, WorkflowView: Clone> Default
    for WorkflowCache<TxView, ReportView, WorkflowView>
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::Utc;

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let cache: WorkflowCache<u32, u32, u32> = WorkflowCache::new();
        let clock = FixedClock::new(Utc::now());
        let id = TransactionId::new().unwrap();

        cache.put_transaction_view(&clock, &id, 7).await;
        assert_eq!(cache.get_transaction_view(&clock, &id).await, Some(7));

        clock.advance(chrono::Duration::minutes(6));
        assert_eq!(cache.get_transaction_view(&clock, &id).await, None);
    }

    #[tokio::test]
    async fn invalidate_clears_both_transaction_and_workflow_views() {
        let cache: WorkflowCache<u32, u32, u32> = WorkflowCache::new();
        let clock = FixedClock::new(Utc::now());
        let id = TransactionId::new().unwrap();

        cache.put_transaction_view(&clock, &id, 1).await;
        cache.put_workflow_view(&clock, &id, 2).await;
        cache.invalidate_transaction(&id).await;

        assert_eq!(cache.get_transaction_view(&clock, &id).await, None);
        assert_eq!(cache.get_workflow_view(&clock, &id).await, None);
    }
}
