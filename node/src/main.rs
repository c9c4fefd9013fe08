//! Tally command-line driver.
//!
//! Opens the configured store, runs one ledger command and prints its result
//! as JSON on stdout.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use tally_ledger::{LedgerEngine, SqliteStore};
use tally_node::commands::{execute, Command};
use tally_node::{logging, NodeConfig};

/// Tally ledger CLI
#[derive(Parser, Debug)]
#[command(name = "tally")]
#[command(about = "Minimal ledger with derived balances and overdraft-safe transfers")]
struct Args {
    /// Database URL (overrides DATABASE_URL)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Load accounts from a CSV file (user_id,user_name,initial_balance_usd)
    Seed {
        /// CSV file (overrides TALLY_SEED_FILE)
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Keep existing accounts instead of replacing them
        #[arg(long)]
        append: bool,
    },
    /// List accounts with their current balances
    Accounts,
    /// Show an account's current balance
    Balance { id: String },
    /// Show an account's balance and transactions, newest first
    History { id: String },
    /// Transfer money between two accounts
    Transfer {
        from: String,
        to: String,
        amount: String,
    },
    /// Verify that balances are non-negative and money is conserved
    Audit,
}

impl Cmd {
    fn into_command(self, config: &NodeConfig) -> Command {
        match self {
            Cmd::Seed { file, append } => Command::Seed {
                file: file.unwrap_or_else(|| config.seed_file.clone()),
                append,
            },
            Cmd::Accounts => Command::Accounts,
            Cmd::Balance { id } => Command::Balance { id },
            Cmd::History { id } => Command::History { id },
            Cmd::Transfer { from, to, amount } => Command::Transfer { from, to, amount },
            Cmd::Audit => Command::Audit,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    // Load configuration
    let mut config = NodeConfig::from_env();
    if let Some(url) = args.database_url {
        config.database_url = url;
    }

    logging::init(&config);

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(anyhow::anyhow!("Configuration error: {}", e));
    }

    let store = SqliteStore::connect(&config.database_url).await?;
    let engine = LedgerEngine::with_config(Arc::new(store.clone()), config.ledger.clone());

    let command = args.command.into_command(&config);
    info!(command = ?command, "Executing command");

    let result = execute(&engine, command).await;
    store.close().await;

    let report = result?;
    println!("{}", serde_json::to_string_pretty(&report.body)?);

    Ok(if report.ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
