//! Bulk loading of accounts from CSV.
//!
//! Expected header: `user_id,user_name,initial_balance_usd`. The whole file
//! is parsed and validated before anything is written. Replacing existing
//! state and inserting the new accounts happen as one atomic step.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use tracing::{error, info, instrument};

use tally_common::{LedgerError, Result};

use crate::account::Account;
use crate::engine::LedgerEngine;
use crate::store::check_batch_unique;

const REQUIRED_COLUMNS: [&str; 3] = ["user_id", "user_name", "initial_balance_usd"];

/// What to do with existing state before loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeedMode {
    /// Delete all transactions and accounts first.
    #[default]
    Replace,
    /// Keep existing accounts; collisions fail the load.
    Append,
}

#[derive(Debug, Deserialize)]
struct SeedRecord {
    user_id: String,
    user_name: String,
    initial_balance_usd: String,
}

fn malformed(line: u64, message: impl ToString) -> LedgerError {
    LedgerError::MalformedRecord {
        line,
        message: message.to_string(),
    }
}

/// Parse and validate every record in a CSV source.
pub fn read_accounts<R: Read>(reader: R) -> Result<Vec<Account>> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers().map_err(|e| malformed(1, e))?.clone();
    for column in REQUIRED_COLUMNS {
        if !headers.iter().any(|h| h == column) {
            return Err(malformed(1, format!("missing column {column}")));
        }
    }

    let mut accounts = Vec::new();
    for result in rdr.records() {
        let record = result.map_err(|e| {
            let line = e.position().map(|p| p.line()).unwrap_or(0);
            malformed(line, e)
        })?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);

        let row: SeedRecord = record
            .deserialize(Some(&headers))
            .map_err(|e| malformed(line, e))?;
        let account = Account::parse(row.user_id, row.user_name, &row.initial_balance_usd)
            .map_err(|e| malformed(line, e))?;
        accounts.push(account);
    }

    check_batch_unique(&accounts)?;
    Ok(accounts)
}

/// Load accounts from a CSV source into the engine.
///
/// Returns the number of accounts created.
#[instrument(skip_all, fields(mode = ?mode))]
pub async fn seed_from_reader<R: Read>(
    engine: &LedgerEngine,
    reader: R,
    mode: SeedMode,
) -> Result<usize> {
    let accounts = match read_accounts(reader) {
        Ok(accounts) => accounts,
        Err(err) => {
            error!(error = %err, "Seed source rejected; nothing was loaded");
            return Err(err);
        }
    };

    let count = accounts.len();
    let stored = match mode {
        SeedMode::Replace => engine.replace_accounts(accounts).await,
        SeedMode::Append => engine.create_accounts(accounts).await,
    };
    if let Err(err) = stored {
        error!(error = %err, "Seeding failed; existing state was kept");
        return Err(err);
    }

    info!(count, "Accounts seeded");
    Ok(count)
}

/// Load accounts from a CSV file.
pub async fn seed_from_path(engine: &LedgerEngine, path: &Path, mode: SeedMode) -> Result<usize> {
    let file = File::open(path).map_err(|e| {
        error!(path = %path.display(), error = %e, "Seed file unavailable");
        LedgerError::Configuration(format!("cannot open seed file {}: {e}", path.display()))
    })?;
    seed_from_reader(engine, file, mode).await
}
