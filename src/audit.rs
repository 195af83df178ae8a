//! Audit log (§4.8): append-only, dual-sinked to the durable store
//! (synchronous) and an external immutability sink (async, reconciled in
//! the background). Every event is content-addressed via
//! [`crate::store::content_hash`], stamped into `AuditEvent::content_hash`
//! before it is persisted.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::clock::Clock;
use crate::domain::{AuditEvent, EventPayload};
use crate::error::Result;
use crate::id::{AuditEventId, TransactionId};
use crate::resilience::{retry_with_backoff, CircuitBreaker, RetryPolicy};
use crate::store::Store;

/// The opaque external immutability sink (§6): accepts `(transaction_id,
/// event_type, payload)` and returns `(external_tx_ref, block_number?)`.
#[async_trait]
pub trait ExternalAuditSink: Send + Sync {
    async fn record(&self, event: &AuditEvent) -> Result<(String, Option<u64>)>;
}

/// Deterministic in-memory sink for tests.
pub struct InMemorySink {
    fail_next: std::sync::Mutex<u32>,
}

impl InMemorySink {
    pub fn new() -> Self {
        InMemorySink {
            fail_next: std::sync::Mutex::new(0),
        }
    }

    pub fn fail_next(&self, n: u32) {
        *self.fail_next.lock().unwrap() = n;
    }
}

impl Default for InMemorySink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExternalAuditSink for InMemorySink {
    async fn record(&self, event: &AuditEvent) -> Result<(String, Option<u64>)> {
        let mut remaining = self.fail_next.lock().unwrap();
        if *remaining > 0 {
            *remaining -= 1;
            return Err(crate::error::EscrowError::AuditSink(
                "simulated sink failure".to_string(),
            ));
        }
        Ok((format!("sink:{}", event.id), None))
    }
}

pub struct AuditLog<S: Store> {
    store: Arc<S>,
    sink: Arc<dyn ExternalAuditSink>,
}

impl<S: Store> AuditLog<S> {
    pub fn new(store: Arc<S>, sink: Arc<dyn ExternalAuditSink>) -> Self {
        AuditLog { store, sink }
    }

    /// Write synchronously to the primary store, then attempt the external
    /// sink write inline (with retry). A sink failure is never fatal for
    /// the domain change (§7) — the row persists as `pending` and the
    /// background reconciler will retry it.
    pub async fn record(
        &self,
        transaction_id: &TransactionId,
        payload: EventPayload,
        clock: &dyn Clock,
    ) -> Result<AuditEvent> {
        let mut event = AuditEvent {
            id: AuditEventId::new().map_err(crate::error::EscrowError::Other)?,
            transaction_id: transaction_id.clone(),
            payload,
            external_tx_ref: None,
            block_number: None,
            timestamp: clock.now(),
            pending: true,
            content_hash: String::new(),
        };
        event.content_hash = crate::store::content_hash(&event)?;
        self.store.append_audit_event(event.clone()).await?;

        match self.sink.record(&event).await {
            Ok((external_tx_ref, block_number)) => {
                self.store
                    .mark_audit_event_acknowledged(&event.id, external_tx_ref, block_number)
                    .await?;
            }
            Err(err) => {
                warn!(%err, event_id = %event.id, "audit sink write failed, left pending for reconciliation");
            }
        }

        self.store.get_audit_trail(transaction_id).await.map(|trail| {
            trail
                .into_iter()
                .find(|e| e.id == event.id)
                .unwrap_or(event)
        })
    }

    pub async fn get_audit_trail(&self, transaction_id: &TransactionId) -> Result<Vec<AuditEvent>> {
        self.store.get_audit_trail(transaction_id).await
    }

    /// Background reconciliation: retry every `pending` row for a
    /// transaction against the sink using the audit-sink resilience policy
    /// (5 attempts, 2s -> 32s).
    pub async fn reconcile_pending(
        &self,
        transaction_id: &TransactionId,
        breaker: &CircuitBreaker,
        clock: &dyn Clock,
    ) -> Result<()> {
        for event in self.store.pending_audit_events(transaction_id).await? {
            let sink = Arc::clone(&self.sink);
            let outcome = retry_with_backoff(
                &RetryPolicy::AUDIT_SINK,
                crate::error::EscrowError::is_retryable,
                || {
                    let sink = Arc::clone(&sink);
                    let event = event.clone();
                    async move { breaker.call(clock, || async move { sink.record(&event).await }).await }
                },
            )
            .await;

            if let Ok((external_tx_ref, block_number)) = outcome {
                self.store
                    .mark_audit_event_acknowledged(&event.id, external_tx_ref, block_number)
                    .await?;
            } else {
                warn!(event_id = %event.id, "audit event still unacknowledged after reconciliation attempt");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::id::TransactionId;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn recorded_event_carries_its_own_content_hash() {
        let log = AuditLog::new(MemoryStore::new(), Arc::new(InMemorySink::new()));
        let txn_id = TransactionId::new().unwrap();
        let event = log
            .record(
                &txn_id,
                EventPayload::TransactionCancelled {
                    reason: "test".to_string(),
                    refunded: false,
                },
                &SystemClock,
            )
            .await
            .unwrap();

        assert!(!event.content_hash.is_empty());
        assert_eq!(event.content_hash, crate::store::content_hash(&event).unwrap());
    }

    #[tokio::test]
    async fn sink_failure_leaves_event_pending_until_reconciled() {
        let sink = Arc::new(InMemorySink::new());
        sink.fail_next(1);
        let log = AuditLog::new(MemoryStore::new(), sink);
        let txn_id = TransactionId::new().unwrap();
        let event = log
            .record(
                &txn_id,
                EventPayload::TransactionCancelled {
                    reason: "test".to_string(),
                    refunded: false,
                },
                &SystemClock,
            )
            .await
            .unwrap();
        assert!(event.pending);

        let breaker = CircuitBreaker::audit_sink();
        log.reconcile_pending(&txn_id, &breaker, &SystemClock)
            .await
            .unwrap();

        let trail = log.get_audit_trail(&txn_id).await.unwrap();
        assert!(!trail[0].pending);
    }
}
