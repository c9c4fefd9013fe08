//! In-process store.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::RwLock;

use tally_common::{now, AccountId, Flows, LedgerError, Result, TransactionId};

use super::{check_batch_unique, check_debit, missing_account, LedgerStore};
use crate::account::Account;
use crate::journal::{newest_first, NewTransaction, Transaction};

#[derive(Debug, Default)]
struct State {
    accounts: HashMap<AccountId, Account>,
    names: HashSet<String>,
    /// Append-only log; position `i` holds transaction id `i + 1`.
    log: Vec<Transaction>,
    /// Positions in `log` per participating account.
    index: HashMap<AccountId, Vec<usize>>,
}

impl State {
    fn next_id(&self) -> TransactionId {
        TransactionId::new(self.log.len() as i64 + 1)
    }

    fn entries_for<'a>(&'a self, id: &AccountId) -> impl Iterator<Item = &'a Transaction> + 'a {
        self.index
            .get(id)
            .into_iter()
            .flatten()
            .map(move |&pos| &self.log[pos])
    }

    fn flows_of(&self, id: &AccountId) -> Result<Flows> {
        let mut flows = Flows::default();
        for tx in self.entries_for(id) {
            if &tx.receiver_id == id {
                flows.credit(tx.amount)?;
            } else {
                flows.debit(tx.amount)?;
            }
        }
        Ok(flows)
    }

    fn check_new_accounts(&self, accounts: &[Account]) -> Result<()> {
        for account in accounts {
            if self.accounts.contains_key(&account.id) {
                return Err(LedgerError::DuplicateAccount(format!("id {}", account.id)));
            }
            if self.names.contains(&account.display_name) {
                return Err(LedgerError::DuplicateAccount(format!(
                    "name {}",
                    account.display_name
                )));
            }
        }
        Ok(())
    }

    fn add_accounts(&mut self, accounts: &[Account]) {
        for account in accounts {
            self.names.insert(account.display_name.clone());
            self.accounts.insert(account.id.clone(), account.clone());
        }
    }
}

/// Store backed by process memory, guarded by a single read/write lock.
///
/// Reads hold the read lock for their whole computation, so a balance never
/// observes a half-applied append.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn insert_accounts(&self, accounts: &[Account]) -> Result<()> {
        check_batch_unique(accounts)?;

        let mut state = self.state.write();
        state.check_new_accounts(accounts)?;
        state.add_accounts(accounts);
        Ok(())
    }

    async fn replace_accounts(&self, accounts: &[Account]) -> Result<()> {
        check_batch_unique(accounts)?;

        let mut fresh = State::default();
        fresh.add_accounts(accounts);
        *self.state.write() = fresh;
        Ok(())
    }

    async fn get_account(&self, id: &AccountId) -> Result<Option<Account>> {
        Ok(self.state.read().accounts.get(id).cloned())
    }

    async fn list_accounts(&self) -> Result<Vec<Account>> {
        Ok(self.state.read().accounts.values().cloned().collect())
    }

    async fn flows(&self, id: &AccountId) -> Result<Flows> {
        self.state.read().flows_of(id)
    }

    async fn transactions_for(&self, id: &AccountId) -> Result<Vec<Transaction>> {
        let state = self.state.read();
        let mut txs: Vec<Transaction> = state.entries_for(id).cloned().collect();
        txs.sort_by(newest_first);
        Ok(txs)
    }

    async fn append_debit(&self, tx: NewTransaction) -> Result<Transaction> {
        let mut state = self.state.write();

        let sender = state
            .accounts
            .get(&tx.sender_id)
            .ok_or_else(|| missing_account(&tx.sender_id))?;
        let receiver = state
            .accounts
            .get(&tx.receiver_id)
            .ok_or_else(|| missing_account(&tx.receiver_id))?;

        let mut sender_flows = state.flows_of(&tx.sender_id)?;
        sender_flows.debit(tx.amount)?;
        let mut receiver_flows = state.flows_of(&tx.receiver_id)?;
        receiver_flows.credit(tx.amount)?;
        check_debit(&tx, sender, &sender_flows, receiver, &receiver_flows)?;

        let committed = tx.commit(state.next_id(), now());
        let pos = state.log.len();
        state
            .index
            .entry(committed.sender_id.clone())
            .or_default()
            .push(pos);
        state
            .index
            .entry(committed.receiver_id.clone())
            .or_default()
            .push(pos);
        state.log.push(committed.clone());

        Ok(committed)
    }

    async fn transaction_count(&self) -> Result<u64> {
        Ok(self.state.read().log.len() as u64)
    }

    async fn clear(&self) -> Result<()> {
        *self.state.write() = State::default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn account(id: &str, name: &str, balance: i64) -> Account {
        Account::new(id, name, Decimal::from(balance)).unwrap()
    }

    fn transfer(from: &str, to: &str, amount: i64) -> NewTransaction {
        NewTransaction::new(from.into(), to.into(), Decimal::from(amount)).unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_lookup() {
        let store = MemoryStore::new();
        store
            .insert_accounts(&[account("u1", "alice", 50), account("u2", "bob", 0)])
            .await
            .unwrap();

        let alice = store.get_account(&"u1".into()).await.unwrap().unwrap();
        assert_eq!(alice.display_name, "alice");
        assert!(store.get_account(&"u3".into()).await.unwrap().is_none());
        assert_eq!(store.list_accounts().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_batch_inserts_nothing() {
        let store = MemoryStore::new();
        store.insert_accounts(&[account("u1", "alice", 50)]).await.unwrap();

        let err = store
            .insert_accounts(&[account("u2", "bob", 0), account("u3", "alice", 0)])
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateAccount(_)));
        assert!(store.get_account(&"u2".into()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_append_assigns_sequential_ids_and_indexes() {
        let store = MemoryStore::new();
        store
            .insert_accounts(&[
                account("u1", "alice", 50),
                account("u2", "bob", 0),
                account("u3", "carol", 0),
            ])
            .await
            .unwrap();

        let first = store.append_debit(transfer("u1", "u2", 20)).await.unwrap();
        let second = store.append_debit(transfer("u2", "u3", 5)).await.unwrap();
        assert_eq!(first.id, TransactionId::new(1));
        assert_eq!(second.id, TransactionId::new(2));

        let flows = store.flows(&"u2".into()).await.unwrap();
        assert_eq!(flows.incoming, Decimal::from(20));
        assert_eq!(flows.outgoing, Decimal::from(5));

        let history = store.transactions_for(&"u2".into()).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, second.id);
        assert!(store.transactions_for(&"u1".into()).await.unwrap().len() == 1);
    }

    #[tokio::test]
    async fn test_append_rejects_unknown_account() {
        let store = MemoryStore::new();
        store.insert_accounts(&[account("u1", "alice", 50)]).await.unwrap();
        let err = store
            .append_debit(transfer("u1", "ghost", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Storage(_)));
        assert_eq!(store.transaction_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_append_rechecks_sender_balance() {
        let store = MemoryStore::new();
        store
            .insert_accounts(&[account("u1", "alice", 50), account("u2", "bob", 0)])
            .await
            .unwrap();

        store.append_debit(transfer("u1", "u2", 30)).await.unwrap();
        let err = store.append_debit(transfer("u1", "u2", 30)).await.unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientBalance {
                required: "30".into(),
                available: "20".into(),
            }
        );
        assert_eq!(store.transaction_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_append_rejects_receiver_overflow() {
        let store = MemoryStore::new();
        let max = Account::new("u1", "alice", Decimal::MAX).unwrap();
        let full = Account::new("u2", "bob", Decimal::MAX).unwrap();
        store.insert_accounts(&[max, full]).await.unwrap();

        let err = store
            .append_debit(NewTransaction::new("u1".into(), "u2".into(), Decimal::ONE).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Overflow(_)));
        assert_eq!(store.transaction_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_replace_accounts() {
        let store = MemoryStore::new();
        store
            .insert_accounts(&[account("u1", "alice", 50), account("u2", "bob", 0)])
            .await
            .unwrap();
        store.append_debit(transfer("u1", "u2", 1)).await.unwrap();

        store
            .replace_accounts(&[account("u1", "alice", 7)])
            .await
            .unwrap();
        assert_eq!(store.list_accounts().await.unwrap().len(), 1);
        assert_eq!(store.transaction_count().await.unwrap(), 0);

        // A colliding batch keeps the previous state.
        let err = store
            .replace_accounts(&[account("u3", "carol", 1), account("u4", "carol", 1)])
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateAccount(_)));
        assert!(store.get_account(&"u1".into()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_clear() {
        let store = MemoryStore::new();
        store
            .insert_accounts(&[account("u1", "alice", 50), account("u2", "bob", 0)])
            .await
            .unwrap();
        store.append_debit(transfer("u1", "u2", 1)).await.unwrap();
        store.clear().await.unwrap();
        assert!(store.list_accounts().await.unwrap().is_empty());
        assert_eq!(store.transaction_count().await.unwrap(), 0);
    }
}
