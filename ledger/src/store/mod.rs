//! Persistence seam for accounts and the transaction log.

use async_trait::async_trait;
use rust_decimal::Decimal;

use tally_common::{AccountId, Flows, LedgerError, Result};

use crate::account::Account;
use crate::journal::{NewTransaction, Transaction};

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Durable, queryable store of accounts and transactions.
///
/// The engine validates input and serialises debits per sender within one
/// process. The store re-checks the sender's balance at commit, so debits
/// stay safe when several processes share the same storage.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Insert a batch of accounts atomically.
    ///
    /// Fails with `DuplicateAccount` on any id or name collision, with existing
    /// rows or within the batch, and inserts nothing in that case.
    async fn insert_accounts(&self, accounts: &[Account]) -> Result<()>;

    /// Remove all transactions and accounts, then insert `accounts`, as one
    /// atomic step. On failure the previous state is kept.
    async fn replace_accounts(&self, accounts: &[Account]) -> Result<()>;

    /// Look up an account.
    async fn get_account(&self, id: &AccountId) -> Result<Option<Account>>;

    /// All accounts, in no particular order.
    async fn list_accounts(&self) -> Result<Vec<Account>>;

    /// Incoming and outgoing totals for an account, from one consistent read.
    async fn flows(&self, id: &AccountId) -> Result<Flows>;

    /// Transactions where the account is sender or receiver, newest first.
    async fn transactions_for(&self, id: &AccountId) -> Result<Vec<Transaction>>;

    /// Append a transfer if the sender's balance still covers it, assigning
    /// its id and commit timestamp.
    ///
    /// The balance check and the write happen under the store's own write
    /// exclusion. Fails with `InsufficientBalance`, or `Overflow` when the
    /// receiver's balance would leave the decimal range, and writes nothing
    /// in that case.
    async fn append_debit(&self, tx: NewTransaction) -> Result<Transaction>;

    /// Number of committed transactions.
    async fn transaction_count(&self) -> Result<u64>;

    /// Remove all transactions, then all accounts.
    async fn clear(&self) -> Result<()>;
}

/// Admission rule for a debit, given both parties' flows with the debit
/// already applied.
pub(crate) fn check_debit(
    tx: &NewTransaction,
    sender: &Account,
    sender_after: &Flows,
    receiver: &Account,
    receiver_after: &Flows,
) -> Result<()> {
    let remaining = sender_after.balance_from(sender.initial_balance)?;
    if remaining < Decimal::ZERO {
        // Opposite signs; cannot overflow.
        let available = remaining + tx.amount;
        return Err(LedgerError::InsufficientBalance {
            required: tx.amount.to_string(),
            available: available.to_string(),
        });
    }
    receiver_after.balance_from(receiver.initial_balance)?;
    Ok(())
}

/// Account referenced by a transfer is missing from storage.
pub(crate) fn missing_account(id: &AccountId) -> LedgerError {
    LedgerError::Storage(format!("foreign key violation: account {id} does not exist"))
}

/// Collision check shared by backends: ids and names within one batch.
pub(crate) fn check_batch_unique(accounts: &[Account]) -> Result<()> {
    use std::collections::HashSet;

    let mut ids = HashSet::with_capacity(accounts.len());
    let mut names = HashSet::with_capacity(accounts.len());
    for account in accounts {
        if !ids.insert(&account.id) {
            return Err(LedgerError::DuplicateAccount(format!("id {}", account.id)));
        }
        if !names.insert(account.display_name.as_str()) {
            return Err(LedgerError::DuplicateAccount(format!(
                "name {}",
                account.display_name
            )));
        }
    }
    Ok(())
}
