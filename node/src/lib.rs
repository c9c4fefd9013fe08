//! Tally Node
//!
//! Wires configuration, logging and storage around the ledger engine and
//! exposes its operations as commands.

pub mod commands;
pub mod config;
pub mod logging;

pub use commands::Command;
pub use config::NodeConfig;
