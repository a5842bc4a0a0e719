//! Error types for the ledger core
//!
//! Errors fall into four classes, exposed through [`LedgerError::kind`]:
//!
//! - **Validation**: malformed input (non-positive amount, malformed or
//!   same-account transfer). Rejected before any lock or persistence call.
//! - **Declined**: business-rule outcomes such as insufficient funds. The
//!   transaction is recorded as `failed`; nothing panics.
//! - **NotFound**: a looked-up transaction does not exist.
//! - **Infrastructure**: a collaborator (store, cache, audit sink) failed.
//!   Only these are worth retrying.

use super::money::Amount;
use super::transaction::{TransactionId, TransactionStatus, TransactionType, UserId};
use thiserror::Error;

/// Failure reported by an external collaborator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("backend failure: {0}")]
    Backend(String),
}

/// Coarse classification used at the service boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Declined,
    NotFound,
    Infrastructure,
}

/// Main error type for the ledger core
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    /// Amount is non-positive, too precise, or out of range
    #[error("Invalid amount '{amount}': {reason}")]
    InvalidAmount { amount: String, reason: &'static str },

    /// Unknown or unsupported transaction type
    #[error("Invalid transaction type '{tx_type}'")]
    InvalidTransactionType { tx_type: String },

    /// A required side of the movement is missing
    #[error("{tx_type} transaction requires {field}")]
    MissingParticipant {
        tx_type: TransactionType,
        field: &'static str,
    },

    #[error("Transfer from user {user_id} to the same account is not allowed")]
    SameAccountTransfer { user_id: UserId },

    #[error("Insufficient funds for user {user_id}: available {available}, requested {requested}")]
    InsufficientFunds {
        user_id: UserId,
        available: Amount,
        requested: Amount,
    },

    /// A balance update would leave the account below zero
    #[error("Balance for user {user_id} cannot be set to negative amount {amount}")]
    NegativeBalance { user_id: UserId, amount: Amount },

    #[error("Arithmetic overflow in {operation} for user {user_id}")]
    ArithmeticOverflow {
        operation: &'static str,
        user_id: UserId,
    },

    #[error("Transaction {id} not found")]
    TransactionNotFound { id: TransactionId },

    #[error("Transaction {id} cannot move from {from} to {to}")]
    InvalidStatusTransition {
        id: TransactionId,
        from: TransactionStatus,
        to: TransactionStatus,
    },

    /// Persistence or cache failure, wrapped with context
    #[error("{context}: {source}")]
    Infrastructure { context: String, source: StoreError },

    /// The compensating write of a failed transfer could not be persisted
    #[error("Rollback of user {user_id} failed after '{cause}': {rollback}")]
    RollbackFailed {
        user_id: UserId,
        cause: String,
        rollback: String,
    },
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::InvalidAmount { .. }
            | LedgerError::InvalidTransactionType { .. }
            | LedgerError::MissingParticipant { .. }
            | LedgerError::SameAccountTransfer { .. }
            | LedgerError::NegativeBalance { .. }
            | LedgerError::ArithmeticOverflow { .. }
            | LedgerError::InvalidStatusTransition { .. } => ErrorKind::Validation,
            LedgerError::InsufficientFunds { .. } => ErrorKind::Declined,
            LedgerError::TransactionNotFound { .. } => ErrorKind::NotFound,
            LedgerError::Infrastructure { .. } | LedgerError::RollbackFailed { .. } => {
                ErrorKind::Infrastructure
            }
        }
    }

    /// Whether retrying the same request could succeed
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Infrastructure
    }

    pub fn invalid_amount(amount: impl Into<String>, reason: &'static str) -> Self {
        LedgerError::InvalidAmount {
            amount: amount.into(),
            reason,
        }
    }

    pub fn invalid_transaction_type(tx_type: impl Into<String>) -> Self {
        LedgerError::InvalidTransactionType {
            tx_type: tx_type.into(),
        }
    }

    pub fn missing_participant(tx_type: TransactionType, field: &'static str) -> Self {
        LedgerError::MissingParticipant { tx_type, field }
    }

    pub fn same_account_transfer(user_id: UserId) -> Self {
        LedgerError::SameAccountTransfer { user_id }
    }

    pub fn insufficient_funds(user_id: UserId, available: Amount, requested: Amount) -> Self {
        LedgerError::InsufficientFunds {
            user_id,
            available,
            requested,
        }
    }

    pub fn negative_balance(user_id: UserId, amount: Amount) -> Self {
        LedgerError::NegativeBalance { user_id, amount }
    }

    pub fn arithmetic_overflow(operation: &'static str, user_id: UserId) -> Self {
        LedgerError::ArithmeticOverflow { operation, user_id }
    }

    pub fn transaction_not_found(id: TransactionId) -> Self {
        LedgerError::TransactionNotFound { id }
    }

    pub fn invalid_status_transition(
        id: TransactionId,
        from: TransactionStatus,
        to: TransactionStatus,
    ) -> Self {
        LedgerError::InvalidStatusTransition { id, from, to }
    }

    pub fn infrastructure(context: impl Into<String>, source: StoreError) -> Self {
        LedgerError::Infrastructure {
            context: context.into(),
            source,
        }
    }

    pub fn rollback_failed(user_id: UserId, cause: &LedgerError, rollback: &LedgerError) -> Self {
        LedgerError::RollbackFailed {
            user_id,
            cause: cause.to_string(),
            rollback: rollback.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::invalid_amount(
        LedgerError::invalid_amount("-5", "must be positive"),
        "Invalid amount '-5': must be positive"
    )]
    #[case::invalid_type(
        LedgerError::invalid_transaction_type("refund"),
        "Invalid transaction type 'refund'"
    )]
    #[case::missing_participant(
        LedgerError::missing_participant(TransactionType::Transfer, "a recipient"),
        "transfer transaction requires a recipient"
    )]
    #[case::same_account(
        LedgerError::same_account_transfer(7),
        "Transfer from user 7 to the same account is not allowed"
    )]
    #[case::insufficient_funds(
        LedgerError::insufficient_funds(1, Amount::from_minor(10_000), Amount::from_minor(15_000)),
        "Insufficient funds for user 1: available 100.00, requested 150.00"
    )]
    #[case::overflow(
        LedgerError::arithmetic_overflow("deposit", 3),
        "Arithmetic overflow in deposit for user 3"
    )]
    #[case::transition(
        LedgerError::invalid_status_transition(9, TransactionStatus::Completed, TransactionStatus::Failed),
        "Transaction 9 cannot move from completed to failed"
    )]
    #[case::infrastructure(
        LedgerError::infrastructure("failed to update balance for user 2", StoreError::Backend("disk full".to_string())),
        "failed to update balance for user 2: backend failure: disk full"
    )]
    fn test_error_display(#[case] error: LedgerError, #[case] expected: &str) {
        assert_eq!(error.to_string(), expected);
    }

    #[rstest]
    #[case(LedgerError::invalid_amount("0", "must be positive"), ErrorKind::Validation)]
    #[case(LedgerError::same_account_transfer(1), ErrorKind::Validation)]
    #[case(LedgerError::insufficient_funds(1, Amount::ZERO, Amount::from_minor(1)), ErrorKind::Declined)]
    #[case(LedgerError::transaction_not_found(4), ErrorKind::NotFound)]
    #[case(LedgerError::infrastructure("ctx", StoreError::NotFound), ErrorKind::Infrastructure)]
    fn test_error_kind(#[case] error: LedgerError, #[case] expected: ErrorKind) {
        assert_eq!(error.kind(), expected);
        assert_eq!(error.is_retryable(), expected == ErrorKind::Infrastructure);
    }

    #[test]
    fn test_rollback_failed_is_retryable_infrastructure() {
        let cause = LedgerError::infrastructure("receiver", StoreError::Backend("down".into()));
        let rollback = LedgerError::infrastructure("sender", StoreError::Backend("down".into()));
        let error = LedgerError::rollback_failed(5, &cause, &rollback);

        assert_eq!(error.kind(), ErrorKind::Infrastructure);
        assert!(error.to_string().starts_with("Rollback of user 5 failed"));
    }
}
