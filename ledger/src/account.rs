//! Account definitions for ledger.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use tally_common::{parse_amount, AccountId, LedgerError, Result};

/// Maximum length of a display name.
pub const MAX_DISPLAY_NAME_LEN: usize = 50;

/// A ledger account.
///
/// The balance is never stored here; only the opening amount the account
/// was created with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Unique account identifier.
    pub id: AccountId,
    /// Unique human-readable name.
    pub display_name: String,
    /// Balance at creation time.
    pub initial_balance: Decimal,
}

impl Account {
    /// Create a validated account record.
    pub fn new(
        id: impl Into<AccountId>,
        display_name: impl Into<String>,
        initial_balance: Decimal,
    ) -> Result<Self> {
        let id = id.into();
        let display_name = display_name.into();

        if !id.is_valid() {
            return Err(LedgerError::invalid_field(
                format!("account id {:?} is not valid", id.as_str()),
                "id",
            ));
        }

        if display_name.trim().is_empty() {
            return Err(LedgerError::invalid_field(
                "display name must not be empty",
                "display_name",
            ));
        }

        if display_name.chars().count() > MAX_DISPLAY_NAME_LEN {
            return Err(LedgerError::invalid_field(
                format!("display name exceeds {MAX_DISPLAY_NAME_LEN} characters"),
                "display_name",
            ));
        }

        Ok(Self {
            id,
            display_name,
            initial_balance,
        })
    }

    /// Create an account from a textual initial balance.
    pub fn parse(
        id: impl Into<AccountId>,
        display_name: impl Into<String>,
        initial_balance: &str,
    ) -> Result<Self> {
        let initial_balance = parse_amount(initial_balance, "initial_balance")?;
        Self::new(id, display_name, initial_balance)
    }
}
