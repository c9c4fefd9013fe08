//! Transaction records in the append-only log.

use std::cmp::Ordering;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tally_common::{ensure_positive, AccountId, LedgerError, Result, Timestamp, TransactionId};

/// Direction of a transaction relative to one account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// The account received the amount.
    Incoming,
    /// The account sent the amount.
    Outgoing,
}

/// A committed ledger entry. Never updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Commit-order identifier.
    pub id: TransactionId,
    /// Debited account.
    pub sender_id: AccountId,
    /// Credited account.
    pub receiver_id: AccountId,
    /// Strictly positive amount.
    pub amount: Decimal,
    /// Commit time.
    pub timestamp: Timestamp,
}

impl Transaction {
    /// Direction of this transaction for the given account.
    pub fn direction_for(&self, account_id: &AccountId) -> Option<Direction> {
        if &self.sender_id == account_id {
            Some(Direction::Outgoing)
        } else if &self.receiver_id == account_id {
            Some(Direction::Incoming)
        } else {
            None
        }
    }
}

/// Ordering used by history listings: newest first, ties by id descending.
pub fn newest_first(a: &Transaction, b: &Transaction) -> Ordering {
    b.timestamp.cmp(&a.timestamp).then_with(|| b.id.cmp(&a.id))
}

/// A transaction about to be appended; id and timestamp are assigned at commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransaction {
    pub sender_id: AccountId,
    pub receiver_id: AccountId,
    pub amount: Decimal,
}

impl NewTransaction {
    /// Create a pending transaction, enforcing the record invariants.
    pub fn new(sender_id: AccountId, receiver_id: AccountId, amount: Decimal) -> Result<Self> {
        let amount = ensure_positive(amount)?;
        if sender_id == receiver_id {
            return Err(LedgerError::SelfTransfer(sender_id));
        }
        Ok(Self {
            sender_id,
            receiver_id,
            amount,
        })
    }

    /// Turn into a committed record.
    pub fn commit(self, id: TransactionId, timestamp: Timestamp) -> Transaction {
        Transaction {
            id,
            sender_id: self.sender_id,
            receiver_id: self.receiver_id,
            amount: self.amount,
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tally_common::now;

    fn tx(id: i64, ts: Timestamp) -> Transaction {
        NewTransaction::new(AccountId::new("a"), AccountId::new("b"), Decimal::ONE)
            .unwrap()
            .commit(TransactionId::new(id), ts)
    }

    #[test]
    fn test_new_transaction_invariants() {
        let a = AccountId::new("a");
        let b = AccountId::new("b");
        assert!(NewTransaction::new(a.clone(), b.clone(), Decimal::TEN).is_ok());
        assert!(matches!(
            NewTransaction::new(a.clone(), a.clone(), Decimal::TEN),
            Err(LedgerError::SelfTransfer(_))
        ));
        assert!(matches!(
            NewTransaction::new(a, b, Decimal::ZERO),
            Err(LedgerError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_direction_for() {
        let t = tx(1, now());
        assert_eq!(t.direction_for(&AccountId::new("a")), Some(Direction::Outgoing));
        assert_eq!(t.direction_for(&AccountId::new("b")), Some(Direction::Incoming));
        assert_eq!(t.direction_for(&AccountId::new("c")), None);
    }

    #[test]
    fn test_newest_first_breaks_ties_by_id() {
        let ts = now();
        let mut txs = vec![tx(1, ts), tx(3, ts - Duration::seconds(5)), tx(2, ts)];
        txs.sort_by(newest_first);
        let ids: Vec<i64> = txs.iter().map(|t| t.id.value()).collect();
        assert_eq!(ids, vec![2, 1, 3]);
    }
}
