//! Command execution against a ledger engine.

use std::path::PathBuf;

use serde_json::{json, Value};
use tracing::info;

use tally_common::{parse_amount, AccountId};
use tally_ledger::seed::{seed_from_path, SeedMode};
use tally_ledger::LedgerEngine;

/// A single operation requested from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Bulk-load accounts from CSV.
    Seed { file: PathBuf, append: bool },
    /// List all accounts with their balances.
    Accounts,
    /// Show one account's derived balance.
    Balance { id: String },
    /// Show one account's transactions, newest first.
    History { id: String },
    /// Move money between accounts.
    Transfer {
        from: String,
        to: String,
        amount: String,
    },
    /// Recompute every balance and check conservation.
    Audit,
}

/// What a command produced: JSON for stdout and whether it succeeded.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub ok: bool,
    pub body: Value,
}

impl Report {
    fn ok(body: Value) -> Self {
        Self { ok: true, body }
    }
}

/// Run a command. Transfer rejections are reported, not raised.
pub async fn execute(engine: &LedgerEngine, command: Command) -> anyhow::Result<Report> {
    match command {
        Command::Seed { file, append } => {
            let mode = if append {
                SeedMode::Append
            } else {
                SeedMode::Replace
            };
            let count = seed_from_path(engine, &file, mode).await?;
            info!(count, file = %file.display(), "Seed complete");
            Ok(Report::ok(json!({ "seeded": count })))
        }
        Command::Accounts => {
            let mut accounts = engine.list_accounts().await?;
            accounts.sort_by(|a, b| a.id.cmp(&b.id));

            let mut rows = Vec::with_capacity(accounts.len());
            for account in accounts {
                let balance = engine.get_balance(&account.id).await?;
                rows.push(json!({
                    "id": account.id,
                    "display_name": account.display_name,
                    "initial_balance": account.initial_balance,
                    "balance": balance,
                }));
            }
            Ok(Report::ok(Value::Array(rows)))
        }
        Command::Balance { id } => {
            let id = AccountId::new(id);
            let balance = engine.get_balance(&id).await?;
            Ok(Report::ok(json!({ "id": id, "balance": balance })))
        }
        Command::History { id } => {
            let statement = engine.statement(&AccountId::new(id)).await?;
            Ok(Report::ok(serde_json::to_value(statement)?))
        }
        Command::Transfer { from, to, amount } => {
            let amount = parse_amount(&amount, "amount")?;
            let outcome = engine
                .transfer(&AccountId::new(from), &AccountId::new(to), amount)
                .await;
            Ok(Report {
                ok: outcome.ok,
                body: serde_json::to_value(&outcome)?,
            })
        }
        Command::Audit => {
            let report = engine.verify_integrity().await?;
            Ok(Report {
                ok: report.is_consistent(),
                body: serde_json::to_value(&report)?,
            })
        }
    }
}
