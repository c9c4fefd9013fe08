//! Transfer protocol states and caller-facing result.

use serde::Serialize;

use tally_common::LedgerError;

use crate::journal::Transaction;

/// Stage of a single transfer call. Stages only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStage {
    /// Checking amount and sender/receiver shape.
    Validating,
    /// Waiting for the sender's exclusive lock.
    Locking,
    /// Resolving accounts and running the overdraft check.
    Checking,
    /// Writing the transaction record.
    Appending,
    /// Record is durable and visible.
    Committed,
}

/// Structured result of a transfer; failures never escape as errors.
#[derive(Debug, Clone, Serialize)]
pub struct TransferOutcome {
    pub ok: bool,
    pub message: String,
    pub transaction: Option<Transaction>,
    /// Error code when `ok` is false.
    pub code: Option<&'static str>,
    /// Stage the call was in when it failed.
    pub failed_at: Option<TransferStage>,
    #[serde(skip)]
    pub error: Option<LedgerError>,
}

impl TransferOutcome {
    /// Successful transfer.
    pub fn committed(transaction: Transaction) -> Self {
        Self {
            ok: true,
            message: "Transfer successful.".to_string(),
            transaction: Some(transaction),
            code: None,
            failed_at: None,
            error: None,
        }
    }

    /// Failed transfer; no side effect took place.
    pub fn failed(error: LedgerError, stage: TransferStage) -> Self {
        Self {
            ok: false,
            message: error.user_message(),
            transaction: None,
            code: Some(error.error_code()),
            failed_at: Some(stage),
            error: Some(error),
        }
    }

    /// Convert back into a `Result`.
    pub fn into_result(self) -> Result<Transaction, LedgerError> {
        match (self.transaction, self.error) {
            (Some(tx), _) => Ok(tx),
            (None, Some(err)) => Err(err),
            (None, None) => Err(LedgerError::TransferFailed(self.message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_common::AccountId;

    #[test]
    fn test_failed_outcome_carries_code() {
        let outcome = TransferOutcome::failed(
            LedgerError::SelfTransfer(AccountId::new("u1")),
            TransferStage::Validating,
        );
        assert!(!outcome.ok);
        assert_eq!(outcome.message, "Cannot send money to yourself.");
        assert_eq!(outcome.code, Some("SELF_TRANSFER"));
        assert!(matches!(
            outcome.into_result(),
            Err(LedgerError::SelfTransfer(_))
        ));
    }

    #[test]
    fn test_outcome_serializes_without_error() {
        let outcome = TransferOutcome::failed(
            LedgerError::InvalidAmount("0".into()),
            TransferStage::Validating,
        );
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["ok"], false);
        assert_eq!(json["failed_at"], "validating");
        assert!(json.get("error").is_none());
    }
}
