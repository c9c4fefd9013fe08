//! Core ledger engine implementation.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{error, info, instrument, warn};

use tally_common::{add_amounts, AccountId, LedgerError, Result};

use crate::account::Account;
use crate::balance::{AccountStatement, IntegrityReport};
use crate::config::LedgerConfig;
use crate::journal::{NewTransaction, Transaction};
use crate::lock_manager::SenderLocks;
use crate::metrics::{LedgerMetrics, MetricsSnapshot, SharedMetrics};
use crate::store::LedgerStore;
use crate::transfer::{TransferOutcome, TransferStage};

/// The ledger engine derives balances from the transaction log and executes
/// overdraft-safe transfers.
///
/// Construct once and share behind an `Arc`; every operation goes through
/// the store handle it was built with.
pub struct LedgerEngine {
    store: Arc<dyn LedgerStore>,
    locks: SenderLocks,
    metrics: SharedMetrics,
    config: LedgerConfig,
}

impl LedgerEngine {
    /// Create an engine with default configuration.
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self::with_config(store, LedgerConfig::default())
    }

    /// Create an engine with the given configuration.
    pub fn with_config(store: Arc<dyn LedgerStore>, config: LedgerConfig) -> Self {
        Self {
            store,
            locks: SenderLocks::new(),
            metrics: Arc::new(LedgerMetrics::new()),
            config,
        }
    }

    /// Current counters.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Create one account; `initial_balance` must parse as a decimal.
    #[instrument(skip_all, fields(id = %id.as_ref()))]
    pub async fn create_account(
        &self,
        id: impl AsRef<str>,
        display_name: impl Into<String>,
        initial_balance: &str,
    ) -> Result<Account> {
        let account = Account::parse(id.as_ref(), display_name, initial_balance)?;
        self.store.insert_accounts(std::slice::from_ref(&account)).await?;
        self.metrics.accounts_created(1);

        info!(
            account = %account.id,
            initial_balance = %account.initial_balance,
            "Account created"
        );
        Ok(account)
    }

    /// Create several accounts atomically: all are stored or none are.
    #[instrument(skip_all, fields(count = accounts.len()))]
    pub async fn create_accounts(&self, accounts: Vec<Account>) -> Result<usize> {
        self.store.insert_accounts(&accounts).await?;
        self.metrics.accounts_created(accounts.len() as u64);

        info!(count = accounts.len(), "Accounts created");
        Ok(accounts.len())
    }

    /// Replace every account and transaction with `accounts` in one atomic
    /// step. On failure the previous state is kept.
    #[instrument(skip_all, fields(count = accounts.len()))]
    pub async fn replace_accounts(&self, accounts: Vec<Account>) -> Result<usize> {
        self.store.replace_accounts(&accounts).await?;
        self.metrics.accounts_created(accounts.len() as u64);

        warn!(count = accounts.len(), "Ledger replaced");
        Ok(accounts.len())
    }

    /// Look up an account.
    pub async fn get_account(&self, id: &AccountId) -> Result<Account> {
        self.store
            .get_account(id)
            .await?
            .ok_or_else(|| LedgerError::NotFound(id.clone()))
    }

    /// All accounts, in no particular order.
    pub async fn list_accounts(&self) -> Result<Vec<Account>> {
        self.store.list_accounts().await
    }

    /// Derived balance: initial balance plus incoming minus outgoing.
    ///
    /// Reads committed state only. Not serialised against concurrent
    /// transfers, so the value may be superseded as soon as it returns.
    #[instrument(skip(self))]
    pub async fn get_balance(&self, id: &AccountId) -> Result<Decimal> {
        let account = self.get_account(id).await?;
        self.derived_balance(&account).await
    }

    /// Transactions where the account is sender or receiver, newest first.
    pub async fn list_transactions(&self, id: &AccountId) -> Result<Vec<Transaction>> {
        self.get_account(id).await?;
        self.store.transactions_for(id).await
    }

    /// Account, derived balance and history from one read of the log.
    pub async fn statement(&self, id: &AccountId) -> Result<AccountStatement> {
        let account = self.get_account(id).await?;
        let transactions = self.store.transactions_for(id).await?;
        AccountStatement::new(account, transactions)
    }

    /// Move `amount` from one account to another.
    ///
    /// Never returns an error: every failure is folded into the outcome,
    /// and a failed outcome guarantees no transaction was recorded.
    #[instrument(skip_all, fields(from = %from, to = %to, amount = %amount))]
    pub async fn transfer(
        &self,
        from: &AccountId,
        to: &AccountId,
        amount: Decimal,
    ) -> TransferOutcome {
        self.metrics.transfer_started();

        let mut stage = TransferStage::Validating;
        match self.run_transfer(from, to, amount, &mut stage).await {
            Ok(tx) => {
                self.metrics.transfer_committed();
                info!(transaction_id = %tx.id, "Transfer committed");
                TransferOutcome::committed(tx)
            }
            Err(err) if err.is_business_rejection() => {
                self.metrics.transfer_rejected();
                warn!(code = err.error_code(), stage = ?stage, error = %err, "Transfer rejected");
                TransferOutcome::failed(err, stage)
            }
            Err(err) => {
                self.metrics.transfer_failed();
                error!(code = err.error_code(), stage = ?stage, error = %err, "Transfer failed");
                TransferOutcome::failed(err, stage)
            }
        }
    }

    /// Same protocol as [`transfer`](Self::transfer), as a typed `Result`.
    pub async fn try_transfer(
        &self,
        from: &AccountId,
        to: &AccountId,
        amount: Decimal,
    ) -> Result<Transaction> {
        self.transfer(from, to, amount).await.into_result()
    }

    async fn run_transfer(
        &self,
        from: &AccountId,
        to: &AccountId,
        amount: Decimal,
        stage: &mut TransferStage,
    ) -> Result<Transaction> {
        *stage = TransferStage::Validating;
        let pending = NewTransaction::new(from.clone(), to.clone(), amount)?;

        *stage = TransferStage::Locking;
        // Held until this function returns, on every path.
        let _guard = self
            .locks
            .acquire(from, self.config.lock_acquisition_timeout)
            .await?;

        *stage = TransferStage::Checking;
        let sender = self
            .store
            .get_account(from)
            .await
            .map_err(as_transfer_fault)?
            .ok_or_else(|| LedgerError::SenderNotFound(from.clone()))?;
        self.store
            .get_account(to)
            .await
            .map_err(as_transfer_fault)?
            .ok_or_else(|| LedgerError::ReceiverNotFound(to.clone()))?;

        let available = self
            .derived_balance(&sender)
            .await
            .map_err(as_transfer_fault)?;
        if available < amount {
            return Err(LedgerError::InsufficientBalance {
                required: amount.to_string(),
                available: available.to_string(),
            });
        }

        // The store re-checks the balance at commit; that guards against
        // writers outside this process, which the sender lock cannot see.
        *stage = TransferStage::Appending;
        let committed = self
            .store
            .append_debit(pending)
            .await
            .map_err(as_transfer_fault)?;

        *stage = TransferStage::Committed;
        Ok(committed)
    }

    async fn derived_balance(&self, account: &Account) -> Result<Decimal> {
        let flows = self.store.flows(&account.id).await?;
        flows.balance_from(account.initial_balance)
    }

    /// Recompute every derived balance and check conservation.
    ///
    /// Meaningful as an audit only while no transfers are running.
    #[instrument(skip(self))]
    pub async fn verify_integrity(&self) -> Result<IntegrityReport> {
        let accounts = self.store.list_accounts().await?;
        let transactions = self.store.transaction_count().await?;

        let mut total_initial = Decimal::ZERO;
        let mut total_derived = Decimal::ZERO;
        let mut negative_balances = Vec::new();

        for account in &accounts {
            let balance = self.derived_balance(account).await?;
            total_initial = add_amounts(total_initial, account.initial_balance)?;
            total_derived = add_amounts(total_derived, balance)?;
            if balance < Decimal::ZERO {
                negative_balances.push((account.id.clone(), balance));
            }
        }
        negative_balances.sort();

        let report = IntegrityReport {
            accounts: accounts.len(),
            transactions,
            total_initial,
            total_derived,
            negative_balances,
        };

        if report.is_consistent() {
            info!(accounts = report.accounts, transactions, "Ledger integrity verified");
        } else {
            error!(?report, "Ledger integrity violated");
        }
        Ok(report)
    }

    /// Remove all accounts and transactions.
    #[instrument(skip(self))]
    pub async fn reset(&self) -> Result<()> {
        self.store.clear().await?;
        warn!("Ledger reset");
        Ok(())
    }
}

/// Storage faults inside the critical section surface as `TransferFailed`.
fn as_transfer_fault(err: LedgerError) -> LedgerError {
    match err {
        LedgerError::Storage(cause) => LedgerError::TransferFailed(cause),
        other => other,
    }
}
