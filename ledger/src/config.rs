//! Ledger engine configuration.

use std::time::Duration;

/// Engine configuration.
#[derive(Debug, Clone, Default)]
pub struct LedgerConfig {
    /// How long a transfer may wait for its sender's lock.
    /// `None` waits indefinitely.
    pub lock_acquisition_timeout: Option<Duration>,
}

impl LedgerConfig {
    /// Set the lock acquisition timeout.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_acquisition_timeout = Some(timeout);
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.lock_acquisition_timeout == Some(Duration::ZERO) {
            return Err("Lock acquisition timeout cannot be zero".to_string());
        }
        Ok(())
    }
}
