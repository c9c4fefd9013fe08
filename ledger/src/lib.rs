//! Tally Ledger Engine
//!
//! Account store and transaction log with balances derived on demand, and a
//! transfer protocol that serialises debits per sending account so no
//! account can be overdrawn under concurrent execution.

pub mod account;
pub mod balance;
pub mod config;
pub mod engine;
pub mod journal;
pub mod lock_manager;
pub mod metrics;
pub mod seed;
pub mod store;
pub mod transfer;

pub use account::Account;
pub use balance::{AccountStatement, IntegrityReport};
pub use config::LedgerConfig;
pub use engine::LedgerEngine;
pub use journal::{Direction, NewTransaction, Transaction};
pub use lock_manager::SenderLocks;
pub use metrics::{LedgerMetrics, MetricsSnapshot};
pub use seed::SeedMode;
pub use store::{LedgerStore, MemoryStore, SqliteStore};
pub use transfer::{TransferOutcome, TransferStage};
