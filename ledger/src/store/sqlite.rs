//! SQLite-backed store.
//!
//! Decimal amounts are stored as canonical text and summed with
//! `rust_decimal`, never as floating point. Every write runs inside a sqlx
//! transaction; returning early drops the transaction, which rolls it back.
//!
//! Each write transaction issues its first write before reading anything, so
//! it holds SQLite's database write lock for every read that follows. Other
//! connections, in this process or another, cannot commit in between.

use std::str::FromStr;

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::sqlite::{
    Sqlite, SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::{Executor, Row};
use tracing::{debug, info, instrument};

use tally_common::{AccountId, Flows, LedgerError, Result, Timestamp, TransactionId};

use super::{check_batch_unique, check_debit, missing_account, LedgerStore};
use crate::account::Account;
use crate::journal::{NewTransaction, Transaction};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS accounts (
        id              TEXT PRIMARY KEY NOT NULL,
        display_name    TEXT NOT NULL UNIQUE,
        initial_balance TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS transactions (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        sender_id   TEXT NOT NULL REFERENCES accounts(id),
        receiver_id TEXT NOT NULL REFERENCES accounts(id),
        amount      TEXT NOT NULL,
        timestamp   TEXT NOT NULL,
        CHECK (sender_id <> receiver_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_transactions_sender ON transactions(sender_id)",
    "CREATE INDEX IF NOT EXISTS idx_transactions_receiver ON transactions(receiver_id)",
];

/// Store persisted in a SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect to `url` (e.g. `sqlite://tally.db` or `sqlite::memory:`),
    /// creating the database file if needed, and apply the schema.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| LedgerError::Configuration(format!("invalid database url {url}: {e}")))?
            .create_if_missing(true)
            .foreign_keys(true);

        // Each in-memory connection is its own database, and closing it
        // discards the data.
        let memory = is_memory_url(url);
        let max_connections = if memory { 1 } else { 8 };

        let mut pool_options = SqlitePoolOptions::new().max_connections(max_connections);
        if memory {
            pool_options = pool_options.idle_timeout(None).max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| storage_error("connect", e))?;

        let store = Self { pool };
        store.migrate().await?;

        info!(url = %url, max_connections, "SQLite store ready");
        Ok(store)
    }

    /// Create tables and indexes if they do not exist.
    pub async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| storage_error("migrate", e))?;
        }
        Ok(())
    }

    /// Close the underlying pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn is_memory_url(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

fn storage_error(operation: &str, err: sqlx::Error) -> LedgerError {
    LedgerError::Storage(format!("{operation}: {err}"))
}

fn parse_decimal(raw: &str, column: &str) -> Result<Decimal> {
    Decimal::from_str(raw)
        .map_err(|e| LedgerError::Storage(format!("corrupt {column} value {raw:?}: {e}")))
}

fn account_from_row(row: &SqliteRow) -> Result<Account> {
    let id: String = row.try_get("id").map_err(|e| storage_error("decode account", e))?;
    let display_name: String = row
        .try_get("display_name")
        .map_err(|e| storage_error("decode account", e))?;
    let initial_balance: String = row
        .try_get("initial_balance")
        .map_err(|e| storage_error("decode account", e))?;

    Ok(Account {
        id: AccountId::new(id),
        display_name,
        initial_balance: parse_decimal(&initial_balance, "initial_balance")?,
    })
}

fn transaction_from_row(row: &SqliteRow) -> Result<Transaction> {
    let decode = |e| storage_error("decode transaction", e);
    let id: i64 = row.try_get("id").map_err(decode)?;
    let sender_id: String = row.try_get("sender_id").map_err(decode)?;
    let receiver_id: String = row.try_get("receiver_id").map_err(decode)?;
    let amount: String = row.try_get("amount").map_err(decode)?;
    let timestamp: Timestamp = row.try_get("timestamp").map_err(decode)?;

    Ok(Transaction {
        id: TransactionId::new(id),
        sender_id: AccountId::new(sender_id),
        receiver_id: AccountId::new(receiver_id),
        amount: parse_decimal(&amount, "amount")?,
        timestamp,
    })
}

async fn fetch_account<'e, E>(executor: E, id: &AccountId) -> Result<Option<Account>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query("SELECT id, display_name, initial_balance FROM accounts WHERE id = ?")
        .bind(id.as_str())
        .fetch_optional(executor)
        .await
        .map_err(|e| storage_error("get account", e))?;

    row.as_ref().map(account_from_row).transpose()
}

/// Both directions come from one statement, so from the same snapshot.
async fn fetch_flows<'e, E>(executor: E, id: &AccountId) -> Result<Flows>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query(
        "SELECT receiver_id, amount FROM transactions WHERE sender_id = ? OR receiver_id = ?",
    )
    .bind(id.as_str())
    .bind(id.as_str())
    .fetch_all(executor)
    .await
    .map_err(|e| storage_error("flows", e))?;

    let mut flows = Flows::default();
    for row in &rows {
        let receiver: String = row
            .try_get("receiver_id")
            .map_err(|e| storage_error("decode flow", e))?;
        let amount: String = row
            .try_get("amount")
            .map_err(|e| storage_error("decode flow", e))?;
        let amount = parse_decimal(&amount, "amount")?;

        if receiver == id.as_str() {
            flows.credit(amount)?;
        } else {
            flows.debit(amount)?;
        }
    }
    Ok(flows)
}

async fn insert_all(conn: &mut SqliteConnection, accounts: &[Account]) -> Result<()> {
    for account in accounts {
        sqlx::query("INSERT INTO accounts (id, display_name, initial_balance) VALUES (?, ?, ?)")
            .bind(account.id.as_str())
            .bind(&account.display_name)
            .bind(account.initial_balance.to_string())
            .execute(&mut *conn)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db) if db.is_unique_violation() => {
                    LedgerError::DuplicateAccount(format!(
                        "id {} or name {}",
                        account.id, account.display_name
                    ))
                }
                other => storage_error("insert account", other),
            })?;
    }
    Ok(())
}

async fn delete_all(conn: &mut SqliteConnection) -> Result<()> {
    for statement in [
        "DELETE FROM transactions",
        "DELETE FROM accounts",
        "DELETE FROM sqlite_sequence WHERE name = 'transactions'",
    ] {
        sqlx::query(statement)
            .execute(&mut *conn)
            .await
            .map_err(|e| storage_error("clear", e))?;
    }
    Ok(())
}

#[async_trait]
impl LedgerStore for SqliteStore {
    #[instrument(skip_all, fields(count = accounts.len()))]
    async fn insert_accounts(&self, accounts: &[Account]) -> Result<()> {
        check_batch_unique(accounts)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage_error("begin", e))?;
        insert_all(&mut *tx, accounts).await?;
        tx.commit().await.map_err(|e| storage_error("commit", e))?;

        debug!(count = accounts.len(), "Accounts inserted");
        Ok(())
    }

    #[instrument(skip_all, fields(count = accounts.len()))]
    async fn replace_accounts(&self, accounts: &[Account]) -> Result<()> {
        check_batch_unique(accounts)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage_error("begin", e))?;
        delete_all(&mut *tx).await?;
        insert_all(&mut *tx, accounts).await?;
        tx.commit().await.map_err(|e| storage_error("commit", e))?;

        debug!(count = accounts.len(), "Accounts replaced");
        Ok(())
    }

    async fn get_account(&self, id: &AccountId) -> Result<Option<Account>> {
        fetch_account(&self.pool, id).await
    }

    async fn list_accounts(&self) -> Result<Vec<Account>> {
        let rows = sqlx::query("SELECT id, display_name, initial_balance FROM accounts")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| storage_error("list accounts", e))?;

        rows.iter().map(account_from_row).collect()
    }

    async fn flows(&self, id: &AccountId) -> Result<Flows> {
        fetch_flows(&self.pool, id).await
    }

    async fn transactions_for(&self, id: &AccountId) -> Result<Vec<Transaction>> {
        let rows = sqlx::query(
            r#"
            SELECT id, sender_id, receiver_id, amount, timestamp
            FROM transactions
            WHERE sender_id = ? OR receiver_id = ?
            ORDER BY timestamp DESC, id DESC
            "#,
        )
        .bind(id.as_str())
        .bind(id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage_error("list transactions", e))?;

        rows.iter().map(transaction_from_row).collect()
    }

    #[instrument(skip_all, fields(from = %new_tx.sender_id, to = %new_tx.receiver_id))]
    async fn append_debit(&self, new_tx: NewTransaction) -> Result<Transaction> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage_error("begin", e))?;

        // Write first: the insert takes the write lock, and the balance
        // check below then sees every committed debit plus this one.
        let timestamp = tally_common::now();
        let result = sqlx::query(
            "INSERT INTO transactions (sender_id, receiver_id, amount, timestamp) VALUES (?, ?, ?, ?)",
        )
        .bind(new_tx.sender_id.as_str())
        .bind(new_tx.receiver_id.as_str())
        .bind(new_tx.amount.to_string())
        .bind(timestamp)
        .execute(&mut *tx)
        .await
        .map_err(|e| storage_error("append transaction", e))?;
        let id = TransactionId::new(result.last_insert_rowid());

        let sender = fetch_account(&mut *tx, &new_tx.sender_id)
            .await?
            .ok_or_else(|| missing_account(&new_tx.sender_id))?;
        let receiver = fetch_account(&mut *tx, &new_tx.receiver_id)
            .await?
            .ok_or_else(|| missing_account(&new_tx.receiver_id))?;
        let sender_flows = fetch_flows(&mut *tx, &new_tx.sender_id).await?;
        let receiver_flows = fetch_flows(&mut *tx, &new_tx.receiver_id).await?;

        let admitted = check_debit(&new_tx, &sender, &sender_flows, &receiver, &receiver_flows);
        if let Err(err) = admitted {
            debug!(error = %err, "Debit refused at commit; rolling back");
            return Err(err);
        }

        tx.commit().await.map_err(|e| storage_error("commit", e))?;
        Ok(new_tx.commit(id, timestamp))
    }

    async fn transaction_count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM transactions")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| storage_error("count transactions", e))?;
        Ok(count as u64)
    }

    async fn clear(&self) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage_error("begin", e))?;
        delete_all(&mut *tx).await?;
        tx.commit().await.map_err(|e| storage_error("commit", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_store() -> SqliteStore {
        SqliteStore::connect("sqlite::memory:").await.unwrap()
    }

    fn account(id: &str, name: &str, balance: &str) -> Account {
        Account::parse(id, name, balance).unwrap()
    }

    #[tokio::test]
    async fn test_round_trips_decimal_text() {
        let store = memory_store().await;
        store
            .insert_accounts(&[account("u1", "alice", "50.25")])
            .await
            .unwrap();

        let alice = store.get_account(&"u1".into()).await.unwrap().unwrap();
        assert_eq!(alice.initial_balance, Decimal::new(5025, 2));
    }

    #[tokio::test]
    async fn test_unique_name_maps_to_duplicate() {
        let store = memory_store().await;
        store.insert_accounts(&[account("u1", "alice", "1")]).await.unwrap();

        let err = store
            .insert_accounts(&[account("u2", "bob", "1"), account("u3", "alice", "1")])
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateAccount(_)));
        // The batch rolled back as a whole.
        assert!(store.get_account(&"u2".into()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_append_and_query() {
        let store = memory_store().await;
        store
            .insert_accounts(&[account("u1", "alice", "50"), account("u2", "bob", "0")])
            .await
            .unwrap();

        let new_tx =
            NewTransaction::new("u1".into(), "u2".into(), Decimal::new(2000, 2)).unwrap();
        let committed = store.append_debit(new_tx).await.unwrap();
        assert_eq!(committed.id, TransactionId::new(1));

        let flows = store.flows(&"u1".into()).await.unwrap();
        assert_eq!(flows.outgoing, Decimal::from(20));
        assert_eq!(flows.incoming, Decimal::ZERO);

        let history = store.transactions_for(&"u2".into()).await.unwrap();
        assert_eq!(history, vec![committed]);
        assert_eq!(store.transaction_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_foreign_key_failure_leaves_no_row() {
        let store = memory_store().await;
        store.insert_accounts(&[account("u1", "alice", "5")]).await.unwrap();

        let new_tx = NewTransaction::new("u1".into(), "ghost".into(), Decimal::ONE).unwrap();
        let err = store.append_debit(new_tx).await.unwrap_err();
        assert!(matches!(err, LedgerError::Storage(_)));
        assert_eq!(store.transaction_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_append_rechecks_balance_inside_transaction() {
        let store = memory_store().await;
        store
            .insert_accounts(&[account("u1", "alice", "50"), account("u2", "bob", "0")])
            .await
            .unwrap();

        let debit = NewTransaction::new("u1".into(), "u2".into(), Decimal::from(30)).unwrap();
        store.append_debit(debit.clone()).await.unwrap();
        let err = store.append_debit(debit).await.unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { .. }));

        // The refused row was rolled back, id included.
        assert_eq!(store.transaction_count().await.unwrap(), 1);
        let next = NewTransaction::new("u1".into(), "u2".into(), Decimal::from(20)).unwrap();
        assert_eq!(store.append_debit(next).await.unwrap().id, TransactionId::new(2));
    }

    #[tokio::test]
    async fn test_append_refuses_receiver_overflow() {
        let store = memory_store().await;
        let max = Decimal::MAX.to_string();
        store
            .insert_accounts(&[account("u1", "alice", &max), account("u2", "bob", &max)])
            .await
            .unwrap();

        let debit = NewTransaction::new("u1".into(), "u2".into(), Decimal::MAX).unwrap();
        let err = store.append_debit(debit).await.unwrap_err();
        assert!(matches!(err, LedgerError::Overflow(_)));
        assert_eq!(store.transaction_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_replace_accounts_is_one_step() {
        let store = memory_store().await;
        store
            .insert_accounts(&[account("u1", "alice", "5"), account("u2", "bob", "0")])
            .await
            .unwrap();
        let debit = NewTransaction::new("u1".into(), "u2".into(), Decimal::ONE).unwrap();
        store.append_debit(debit).await.unwrap();

        store
            .replace_accounts(&[account("u2", "bob", "9"), account("u3", "carol", "1")])
            .await
            .unwrap();
        assert_eq!(store.list_accounts().await.unwrap().len(), 2);
        assert_eq!(store.transaction_count().await.unwrap(), 0);
        assert!(store.get_account(&"u1".into()).await.unwrap().is_none());

        let err = store
            .replace_accounts(&[account("u4", "dave", "1"), account("u4", "erin", "1")])
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateAccount(_)));
        assert_eq!(store.list_accounts().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_memory_pool_never_recycles_its_connection() {
        let store = memory_store().await;
        let options = store.pool.options();
        assert_eq!(options.get_max_connections(), 1);
        assert_eq!(options.get_idle_timeout(), None);
        assert_eq!(options.get_max_lifetime(), None);
    }

    #[tokio::test]
    async fn test_clear_resets_ids() {
        let store = memory_store().await;
        store
            .insert_accounts(&[account("u1", "alice", "5"), account("u2", "bob", "0")])
            .await
            .unwrap();
        let new_tx = NewTransaction::new("u1".into(), "u2".into(), Decimal::ONE).unwrap();
        store.append_debit(new_tx.clone()).await.unwrap();

        store.clear().await.unwrap();
        store
            .insert_accounts(&[account("u1", "alice", "5"), account("u2", "bob", "0")])
            .await
            .unwrap();
        let again = store.append_debit(new_tx).await.unwrap();
        assert_eq!(again.id, TransactionId::new(1));
    }
}
