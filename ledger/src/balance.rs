//! Derived balance views.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tally_common::{AccountId, Flows, Result};

use crate::account::Account;
use crate::journal::{Direction, Transaction};

/// An account together with its derived balance and history.
///
/// `balance` and the totals are computed from exactly the transactions
/// listed, so they always agree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountStatement {
    pub account: Account,
    pub balance: Decimal,
    /// Total received.
    pub total_incoming: Decimal,
    /// Total sent.
    pub total_outgoing: Decimal,
    /// Newest first.
    pub transactions: Vec<Transaction>,
}

impl AccountStatement {
    /// Build a statement from an account and its history.
    pub fn new(account: Account, transactions: Vec<Transaction>) -> Result<Self> {
        let mut flows = Flows::default();
        for tx in &transactions {
            match tx.direction_for(&account.id) {
                Some(Direction::Incoming) => flows.credit(tx.amount)?,
                Some(Direction::Outgoing) => flows.debit(tx.amount)?,
                None => {}
            }
        }
        let balance = flows.balance_from(account.initial_balance)?;

        Ok(Self {
            account,
            balance,
            total_incoming: flows.incoming,
            total_outgoing: flows.outgoing,
            transactions,
        })
    }
}

/// Result of recomputing every derived balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub accounts: usize,
    pub transactions: u64,
    /// Sum of initial balances.
    pub total_initial: Decimal,
    /// Sum of derived balances; equals `total_initial` when money is conserved.
    pub total_derived: Decimal,
    /// Accounts whose derived balance is below zero.
    pub negative_balances: Vec<(AccountId, Decimal)>,
}

impl IntegrityReport {
    /// Check that money is conserved and no balance is negative.
    pub fn is_consistent(&self) -> bool {
        self.total_initial == self.total_derived && self.negative_balances.is_empty()
    }
}
