//! Monetary amounts for the ledger.
//!
//! All amounts are `rust_decimal::Decimal` in a single implicit currency.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{LedgerError, Result};

/// Maximum number of fractional digits accepted for an amount.
pub const MAX_SCALE: u32 = 8;

/// Parse a decimal amount from user input.
///
/// Accepts plain decimal notation (`"50"`, `"-5.25"`, `"0.001"`); rejects empty
/// strings, exponent notation and values with more than [`MAX_SCALE`] fractional digits.
pub fn parse_amount(input: &str, field: &str) -> Result<Decimal> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(LedgerError::invalid_field(
            format!("{field} must not be empty"),
            field,
        ));
    }

    let value = Decimal::from_str_exact(trimmed)
        .or_else(|_| Decimal::from_str(trimmed))
        .map_err(|e| {
            LedgerError::invalid_field(format!("{field} is not a decimal: {trimmed} ({e})"), field)
        })?;

    if value.scale() > MAX_SCALE {
        return Err(LedgerError::invalid_field(
            format!("{field} has more than {MAX_SCALE} decimal places"),
            field,
        ));
    }

    Ok(value.normalize())
}

/// Check that a transfer amount is strictly positive.
pub fn ensure_positive(amount: Decimal) -> Result<Decimal> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidAmount(amount.to_string()));
    }
    Ok(amount)
}

/// Incoming and outgoing totals for one account over the transaction log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flows {
    /// Sum of amounts where the account is the receiver.
    pub incoming: Decimal,
    /// Sum of amounts where the account is the sender.
    pub outgoing: Decimal,
}

/// Checked decimal addition.
pub fn add_amounts(a: Decimal, b: Decimal) -> Result<Decimal> {
    a.checked_add(b)
        .ok_or_else(|| LedgerError::Overflow(format!("{a} + {b}")))
}

impl Flows {
    /// Record a credit.
    pub fn credit(&mut self, amount: Decimal) -> Result<()> {
        self.incoming = add_amounts(self.incoming, amount)?;
        Ok(())
    }

    /// Record a debit.
    pub fn debit(&mut self, amount: Decimal) -> Result<()> {
        self.outgoing = add_amounts(self.outgoing, amount)?;
        Ok(())
    }

    /// Derived balance on top of an initial balance.
    pub fn balance_from(&self, initial: Decimal) -> Result<Decimal> {
        let gross = add_amounts(initial, self.incoming)?;
        gross
            .checked_sub(self.outgoing)
            .ok_or_else(|| LedgerError::Overflow(format!("{gross} - {}", self.outgoing)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("50.00", "amount").unwrap(), Decimal::from(50));
        assert_eq!(parse_amount(" -5 ", "amount").unwrap(), Decimal::from(-5));
        assert_eq!(
            parse_amount("0.25", "amount").unwrap(),
            Decimal::new(25, 2)
        );
    }

    #[test]
    fn test_parse_amount_rejects_garbage() {
        let err = parse_amount("fifty", "initial_balance").unwrap_err();
        assert_eq!(err.error_code(), "INVALID_ARGUMENT");
        assert!(parse_amount("", "amount").is_err());
        assert!(parse_amount("1.123456789", "amount").is_err());
    }

    #[test]
    fn test_ensure_positive() {
        assert!(ensure_positive(Decimal::ONE).is_ok());
        assert!(matches!(
            ensure_positive(Decimal::ZERO),
            Err(LedgerError::InvalidAmount(_))
        ));
        assert!(ensure_positive(Decimal::from(-5)).is_err());
    }

    #[test]
    fn test_flows_balance() {
        let mut flows = Flows::default();
        flows.credit(Decimal::from(20)).unwrap();
        flows.debit(Decimal::from(5)).unwrap();
        assert_eq!(flows.balance_from(Decimal::from(50)).unwrap(), Decimal::from(65));
    }

    #[test]
    fn test_flows_overflow_is_an_error() {
        let mut flows = Flows::default();
        flows.credit(Decimal::MAX).unwrap();
        let err = flows.credit(Decimal::ONE).unwrap_err();
        assert_eq!(err.error_code(), "AMOUNT_OUT_OF_RANGE");
        assert_eq!(flows.incoming, Decimal::MAX);

        assert!(matches!(
            flows.balance_from(Decimal::MAX),
            Err(LedgerError::Overflow(_))
        ));
        assert!(add_amounts(Decimal::MIN, -Decimal::ONE).is_err());
    }
}
