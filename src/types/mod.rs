//! Types module
//!
//! Contains the core data structures of the ledger:
//! - `money`: fixed-point monetary amounts
//! - `balance`: per-user balances and their history rows
//! - `transaction`: transaction records, identifiers and the status machine
//! - `audit`: audit log entries
//! - `error`: error types for the ledger core

pub mod audit;
pub mod balance;
pub mod error;
pub mod money;
pub mod transaction;

pub use audit::{AuditAction, AuditEntry, EntityType};
pub use balance::{Balance, BalanceHistory};
pub use error::{ErrorKind, LedgerError, StoreError};
pub use money::Amount;
pub use transaction::{
    Movement, Transaction, TransactionId, TransactionStatus, TransactionType, UserId,
};
