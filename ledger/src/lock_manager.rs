//! Per-sender exclusive locks for the transfer critical section.
//!
//! Every debit of an account runs while holding that account's slot. Slots
//! are created on demand and pruned once the last holder or waiter is gone.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use tally_common::{AccountId, LedgerError, Result};

type Slot = Arc<Mutex<()>>;

/// Keyed mutex over sending accounts.
#[derive(Debug, Default, Clone)]
pub struct SenderLocks {
    slots: Arc<DashMap<AccountId, Slot>>,
}

impl SenderLocks {
    /// Create an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire exclusive access for `account_id`.
    ///
    /// Waits without limit when `timeout` is `None`. Dropping the returned
    /// future before it resolves leaves no trace.
    pub async fn acquire(
        &self,
        account_id: &AccountId,
        timeout: Option<Duration>,
    ) -> Result<SenderGuard> {
        let slot = self.slot(account_id);

        let guard = match timeout {
            None => slot.lock_owned().await,
            Some(limit) => {
                // `lock_owned` consumes `slot`; once this resolves no local
                // reference remains, so `prune` below can drop the entry.
                let acquired = tokio::time::timeout(limit, slot.lock_owned()).await;
                match acquired {
                    Ok(guard) => guard,
                    Err(_) => {
                        warn!(
                            account = %account_id,
                            timeout_ms = limit.as_millis() as u64,
                            "Sender lock timed out"
                        );
                        self.prune(account_id);
                        return Err(LedgerError::LockTimeout(account_id.clone()));
                    }
                }
            }
        };

        debug!(account = %account_id, "Sender lock acquired");

        Ok(SenderGuard {
            guard: Some(guard),
            account_id: account_id.clone(),
            locks: self.clone(),
        })
    }

    /// Number of accounts with a live slot (held or awaited).
    pub fn active_slots(&self) -> usize {
        self.slots.len()
    }

    /// Check whether a slot for the account is currently held.
    pub fn is_locked(&self, account_id: &AccountId) -> bool {
        let slot = match self.slots.get(account_id) {
            Some(slot) => Arc::clone(&slot),
            None => return false,
        };
        let held = slot.try_lock().is_err();
        held
    }

    fn slot(&self, account_id: &AccountId) -> Slot {
        self.slots
            .entry(account_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the slot if the map holds the only reference.
    fn prune(&self, account_id: &AccountId) {
        self.slots
            .remove_if(account_id, |_, slot| Arc::strong_count(slot) == 1);
    }
}

/// Exclusive access to one sender; released on drop.
#[derive(Debug)]
pub struct SenderGuard {
    guard: Option<OwnedMutexGuard<()>>,
    account_id: AccountId,
    locks: SenderLocks,
}

impl SenderGuard {
    /// The locked account.
    pub fn account_id(&self) -> &AccountId {
        &self.account_id
    }
}

impl Drop for SenderGuard {
    fn drop(&mut self) {
        // Release the mutex before pruning so the slot's refcount can reach one.
        self.guard.take();
        self.locks.prune(&self.account_id);
        debug!(account = %self.account_id, "Sender lock released");
    }
}
