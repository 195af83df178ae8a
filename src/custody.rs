//! Custody adapter contract (§4.4): the abstract programmable-wallet
//! provider the orchestrator depends on. `InMemoryCustodyAdapter` is the
//! deterministic test double, shaped after `other_examples`'s `EscrowManager`
//! (state-checked create/fund/release/refund operations).

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::{EscrowError, Result};
use crate::id::{AccountId, MilestoneId, TransactionId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountDetails {
    pub id: AccountId,
    pub address: String,
    pub balance: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Milestone {
    pub id: MilestoneId,
    pub amount: Decimal,
    pub recipient: String,
    pub conditions: serde_json::Value,
    pub auto_release: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceiptStatus {
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub id: String,
    pub external_tx_ref: String,
    pub status: ReceiptStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementReceipt {
    pub external_tx_ref: String,
    pub status: ReceiptStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Distribution {
    pub recipient: String,
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub description: String,
    pub amount: Decimal,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[async_trait]
pub trait CustodyAdapter: Send + Sync {
    async fn create_account(
        &self,
        transaction_id: &TransactionId,
        initial_deposit: Decimal,
    ) -> Result<AccountDetails>;

    async fn configure_milestones(
        &self,
        account_id: &AccountId,
        milestones: Vec<Milestone>,
    ) -> Result<()>;

    async fn release_milestone(
        &self,
        account_id: &AccountId,
        milestone_id: &MilestoneId,
        recipient: &str,
        amount: Decimal,
    ) -> Result<PaymentReceipt>;

    async fn execute_settlement(
        &self,
        account_id: &AccountId,
        settlement_key: &str,
        distributions: Vec<Distribution>,
    ) -> Result<SettlementReceipt>;

    async fn get_balance(&self, account_id: &AccountId) -> Result<Decimal>;

    async fn get_history(&self, account_id: &AccountId) -> Result<Vec<HistoryEntry>>;

    fn verify_webhook(&self, payload: &[u8], signature: &str) -> bool;
}

struct Account {
    details: AccountDetails,
    milestones: HashMap<String, Milestone>,
    released: HashMap<String, PaymentReceipt>,
    settlements: HashMap<String, SettlementReceipt>,
    history: Vec<HistoryEntry>,
    created_for: HashMap<String, AccountId>,
}

/// Deterministic in-memory custody adapter for tests: idempotent on
/// `transaction_id` for account creation, on `milestone_id` for milestone
/// release, and on a client-generated settlement key for settlement (§4.4,
/// §5 idempotency guarantee).
pub struct InMemoryCustodyAdapter {
    accounts: Mutex<HashMap<String, Account>>,
    webhook_secret: Vec<u8>,
    fail_next_releases: Mutex<u32>,
}

impl InMemoryCustodyAdapter {
    pub fn new(webhook_secret: impl Into<Vec<u8>>) -> Self {
        InMemoryCustodyAdapter {
            accounts: Mutex::new(HashMap::new()),
            webhook_secret: webhook_secret.into(),
            fail_next_releases: Mutex::new(0),
        }
    }

    /// Test hook: make the next `n` `release_milestone` calls fail, to
    /// exercise retry and circuit-breaker behavior deterministically.
    pub fn fail_next_releases(&self, n: u32) {
        *self.fail_next_releases.lock().unwrap() = n;
    }
}

type HmacSha256 = Hmac<Sha256>;

#[async_trait]
impl CustodyAdapter for InMemoryCustodyAdapter {
    async fn create_account(
        &self,
        transaction_id: &TransactionId,
        initial_deposit: Decimal,
    ) -> Result<AccountDetails> {
        let mut accounts = self.accounts.lock().unwrap();
        if let Some(existing_id) = accounts
            .values()
            .find(|a| a.created_for.contains_key(transaction_id.as_str()))
            .map(|a| a.details.id.clone())
        {
            return Ok(accounts[existing_id.as_str()].details.clone());
        }

        let id = AccountId::new().map_err(EscrowError::Other)?;
        let mut created_for = HashMap::new();
        created_for.insert(transaction_id.as_str().to_string(), id.clone());
        let details = AccountDetails {
            id: id.clone(),
            address: format!("custody:{id}"),
            balance: initial_deposit,
        };
        accounts.insert(
            id.as_str().to_string(),
            Account {
                details: details.clone(),
                milestones: HashMap::new(),
                released: HashMap::new(),
                settlements: HashMap::new(),
                history: vec![HistoryEntry {
                    description: "initial deposit".to_string(),
                    amount: initial_deposit,
                    timestamp: chrono::Utc::now(),
                }],
                created_for,
            },
        );
        Ok(details)
    }

    async fn configure_milestones(
        &self,
        account_id: &AccountId,
        milestones: Vec<Milestone>,
    ) -> Result<()> {
        let mut accounts = self.accounts.lock().unwrap();
        let account = accounts
            .get_mut(account_id.as_str())
            .ok_or_else(|| EscrowError::not_found("custody_account", account_id.as_str()))?;
        account.milestones = milestones
            .into_iter()
            .map(|m| (m.id.as_str().to_string(), m))
            .collect();
        Ok(())
    }

    async fn release_milestone(
        &self,
        account_id: &AccountId,
        milestone_id: &MilestoneId,
        recipient: &str,
        amount: Decimal,
    ) -> Result<PaymentReceipt> {
        {
            let mut remaining = self.fail_next_releases.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(EscrowError::Custody("simulated custody failure".to_string()));
            }
        }

        let mut accounts = self.accounts.lock().unwrap();
        let account = accounts
            .get_mut(account_id.as_str())
            .ok_or_else(|| EscrowError::not_found("custody_account", account_id.as_str()))?;

        if let Some(existing) = account.released.get(milestone_id.as_str()) {
            return Ok(existing.clone());
        }

        if amount > account.details.balance {
            return Err(EscrowError::Custody("insufficient balance".to_string()));
        }

        account.details.balance -= amount;
        let receipt = PaymentReceipt {
            id: milestone_id.as_str().to_string(),
            external_tx_ref: format!("release:{milestone_id}"),
            status: ReceiptStatus::Completed,
        };
        account
            .released
            .insert(milestone_id.as_str().to_string(), receipt.clone());
        account.history.push(HistoryEntry {
            description: format!("milestone release to {recipient}"),
            amount,
            timestamp: chrono::Utc::now(),
        });
        Ok(receipt)
    }

    async fn execute_settlement(
        &self,
        account_id: &AccountId,
        settlement_key: &str,
        distributions: Vec<Distribution>,
    ) -> Result<SettlementReceipt> {
        let mut accounts = self.accounts.lock().unwrap();
        let account = accounts
            .get_mut(account_id.as_str())
            .ok_or_else(|| EscrowError::not_found("custody_account", account_id.as_str()))?;

        if let Some(existing) = account.settlements.get(settlement_key) {
            return Ok(existing.clone());
        }

        // Unlike `release_milestone`, settlement is not checked against the
        // tracked balance: the account only ever records the earnest-money
        // deposit plus verification releases, while settlement distributes
        // the full purchase price, funded at closing from outside the system
        // (buyer financing, which §1 puts out of scope). The custody
        // provider settles this as one atomic wire independent of the
        // escrow account's running ledger.
        let total: Decimal = distributions.iter().map(|d| d.amount).sum();
        account.details.balance -= total;
        for d in &distributions {
            account.history.push(HistoryEntry {
                description: format!("settlement distribution to {}", d.recipient),
                amount: d.amount,
                timestamp: chrono::Utc::now(),
            });
        }
        let receipt = SettlementReceipt {
            external_tx_ref: format!("settlement:{settlement_key}"),
            status: ReceiptStatus::Completed,
        };
        account
            .settlements
            .insert(settlement_key.to_string(), receipt.clone());
        Ok(receipt)
    }

    async fn get_balance(&self, account_id: &AccountId) -> Result<Decimal> {
        let accounts = self.accounts.lock().unwrap();
        Ok(accounts
            .get(account_id.as_str())
            .ok_or_else(|| EscrowError::not_found("custody_account", account_id.as_str()))?
            .details
            .balance)
    }

    async fn get_history(&self, account_id: &AccountId) -> Result<Vec<HistoryEntry>> {
        let accounts = self.accounts.lock().unwrap();
        Ok(accounts
            .get(account_id.as_str())
            .ok_or_else(|| EscrowError::not_found("custody_account", account_id.as_str()))?
            .history
            .clone())
    }

    fn verify_webhook(&self, payload: &[u8], signature: &str) -> bool {
        let Ok(sig_bytes) = hex::decode(signature) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(&self.webhook_secret) else {
            return false;
        };
        mac.update(payload);
        mac.verify_slice(&sig_bytes).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn account_creation_is_idempotent_per_transaction() {
        let adapter = InMemoryCustodyAdapter::new(b"secret".to_vec());
        let txn = TransactionId::new().unwrap();
        let a = adapter.create_account(&txn, dec!(100)).await.unwrap();
        let b = adapter.create_account(&txn, dec!(999)).await.unwrap();
        assert_eq!(a.id, b.id);
    }

    #[tokio::test]
    async fn milestone_release_is_idempotent() {
        let adapter = InMemoryCustodyAdapter::new(b"secret".to_vec());
        let txn = TransactionId::new().unwrap();
        let account = adapter.create_account(&txn, dec!(1000)).await.unwrap();
        let milestone_id = MilestoneId::new().unwrap();
        let first = adapter
            .release_milestone(&account.id, &milestone_id, "agent", dec!(100))
            .await
            .unwrap();
        let second = adapter
            .release_milestone(&account.id, &milestone_id, "agent", dec!(100))
            .await
            .unwrap();
        assert_eq!(first.external_tx_ref, second.external_tx_ref);
        assert_eq!(adapter.get_balance(&account.id).await.unwrap(), dec!(900));
    }

    #[test]
    fn webhook_signature_must_match() {
        let adapter = InMemoryCustodyAdapter::new(b"secret".to_vec());
        let mut mac = HmacSha256::new_from_slice(b"secret").unwrap();
        mac.update(b"payload");
        let sig = hex::encode(mac.finalize().into_bytes());
        assert!(adapter.verify_webhook(b"payload", &sig));
        assert!(!adapter.verify_webhook(b"tampered", &sig));
    }
}
