//! Error types for ledger operations.

use crate::AccountId;
use thiserror::Error;

/// Main error type for ledger operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Malformed input.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        message: String,
        field: Option<String>,
    },

    /// Transfer amount is zero or negative.
    #[error("Amount must be greater than zero (got {0}).")]
    InvalidAmount(String),

    /// Account not found.
    #[error("Account not found: {0}")]
    NotFound(AccountId),

    /// Transfer sender not found.
    #[error("Sender does not exist: {0}")]
    SenderNotFound(AccountId),

    /// Transfer receiver not found.
    #[error("Receiver does not exist: {0}")]
    ReceiverNotFound(AccountId),

    /// Account id or display name already taken.
    #[error("Duplicate account: {0}")]
    DuplicateAccount(String),

    /// Sender equals receiver.
    #[error("Cannot send money to yourself ({0}).")]
    SelfTransfer(AccountId),

    /// Result would not fit the decimal range.
    #[error("Amount out of range: {0}")]
    Overflow(String),

    /// Sender balance does not cover the amount.
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: String, available: String },

    /// Commit failed and was rolled back.
    #[error("Transfer failed: {0}")]
    TransferFailed(String),

    /// Storage layer fault.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Sender lock could not be acquired in time.
    #[error("Timed out waiting for account lock: {0}")]
    LockTimeout(AccountId),

    /// Bulk-load record could not be used.
    #[error("Malformed record at line {line}: {message}")]
    MalformedRecord { line: u64, message: String },

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl LedgerError {
    /// Invalid argument naming the offending field.
    pub fn invalid_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        LedgerError::InvalidArgument {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Check if this error is retryable.
    ///
    /// Only faults that leave no partial effect qualify.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LedgerError::TransferFailed(_) | LedgerError::Storage(_) | LedgerError::LockTimeout(_)
        )
    }

    /// Check if this is an expected business outcome rather than a fault.
    pub fn is_business_rejection(&self) -> bool {
        matches!(
            self,
            LedgerError::InvalidArgument { .. }
                | LedgerError::InvalidAmount(_)
                | LedgerError::NotFound(_)
                | LedgerError::SenderNotFound(_)
                | LedgerError::ReceiverNotFound(_)
                | LedgerError::DuplicateAccount(_)
                | LedgerError::SelfTransfer(_)
                | LedgerError::Overflow(_)
                | LedgerError::InsufficientBalance { .. }
        )
    }

    /// Get error code for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            LedgerError::InvalidArgument { .. } => "INVALID_ARGUMENT",
            LedgerError::InvalidAmount(_) => "INVALID_AMOUNT",
            LedgerError::NotFound(_) => "NOT_FOUND",
            LedgerError::SenderNotFound(_) => "SENDER_NOT_FOUND",
            LedgerError::ReceiverNotFound(_) => "RECEIVER_NOT_FOUND",
            LedgerError::DuplicateAccount(_) => "DUPLICATE_ACCOUNT",
            LedgerError::SelfTransfer(_) => "SELF_TRANSFER",
            LedgerError::Overflow(_) => "AMOUNT_OUT_OF_RANGE",
            LedgerError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            LedgerError::TransferFailed(_) => "TRANSFER_FAILED",
            LedgerError::Storage(_) => "STORAGE_ERROR",
            LedgerError::LockTimeout(_) => "LOCK_TIMEOUT",
            LedgerError::MalformedRecord { .. } => "MALFORMED_RECORD",
            LedgerError::Configuration(_) => "CONFIGURATION_ERROR",
        }
    }

    /// Short message shown to the caller of a transfer.
    pub fn user_message(&self) -> String {
        match self {
            LedgerError::InvalidAmount(_) => "Amount must be greater than zero.".to_string(),
            LedgerError::SelfTransfer(_) => "Cannot send money to yourself.".to_string(),
            LedgerError::SenderNotFound(_) => "Sender does not exist.".to_string(),
            LedgerError::ReceiverNotFound(_) => "Receiver does not exist.".to_string(),
            LedgerError::InsufficientBalance { .. } => "Insufficient balance.".to_string(),
            LedgerError::Overflow(_) => "Amount out of range.".to_string(),
            other => other.to_string(),
        }
    }
}

/// Result type alias for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
