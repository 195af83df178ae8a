//! Opaque, stable, human-readable entity identifiers.
//!
//! Every entity is keyed by a bech32m encoding of a fresh uuid7, the same
//! construction the teacher uses for its wallet/entity addresses
//! (`utils::new_uuid_to_bech32`), with a type-specific human-readable prefix
//! so ids are self-describing on sight and in logs.

use std::fmt;
use std::marker::PhantomData;

use bech32::Bech32m;
use serde::{Deserialize, Serialize};
use uuid7::uuid7;

pub trait Kind {
    const HRP: &'static str;
}

macro_rules! kind {
    ($name:ident, $hrp:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub struct $name;
        impl Kind for $name {
            const HRP: &'static str = $hrp;
        }
    };
}

kind!(TransactionKind, "txn");
kind!(TaskKind, "task");
kind!(ReportKind, "rpt");
kind!(PaymentKind, "pay");
kind!(SettlementKind, "stl");
kind!(AuditEventKind, "evt");
kind!(DisputeKind, "dsp");
kind!(AccountKind, "acct");
kind!(MilestoneKind, "ms");

#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Id<K> {
    value: String,
    #[serde(skip)]
    _kind: PhantomData<K>,
}

impl<K: Kind> Id<K> {
    pub fn new() -> anyhow::Result<Self> {
        let hrp = bech32::Hrp::parse(K::HRP)?;
        let encoded = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
        Ok(Id {
            value: encoded,
            _kind: PhantomData,
        })
    }

    pub fn parse(value: impl Into<String>) -> Self {
        Id {
            value: value.into(),
            _kind: PhantomData,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl<K> fmt::Debug for Id<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl<K> fmt::Display for Id<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

pub type TransactionId = Id<TransactionKind>;
pub type TaskId = Id<TaskKind>;
pub type ReportId = Id<ReportKind>;
pub type PaymentId = Id<PaymentKind>;
pub type SettlementId = Id<SettlementKind>;
pub type AuditEventId = Id<AuditEventKind>;
pub type DisputeId = Id<DisputeKind>;
pub type AccountId = Id<AccountKind>;
pub type MilestoneId = Id<MilestoneKind>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_prefixed_per_kind() {
        let txn = TransactionId::new().unwrap();
        let task = TaskId::new().unwrap();
        assert!(txn.as_str().starts_with("txn1"));
        assert!(task.as_str().starts_with("task1"));
        assert_ne!(txn.as_str(), task.as_str());
    }

    #[test]
    fn two_ids_never_collide() {
        let a = TransactionId::new().unwrap();
        let b = TransactionId::new().unwrap();
        assert_ne!(a, b);
    }
}
