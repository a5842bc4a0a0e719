//! Ledger Link Library
//! # Overview
//!
//! The ledger core of a payments service: per-user balances, a transaction
//! state machine, and a processor that applies deposits, withdrawals and
//! transfers safely under concurrency.
//!
//! # Architecture
//!
//! The system is organized into several key components:
//!
//! - [`types`] - Core data types (Amount, Balance, Transaction, AuditEntry, errors)
//! - [`core`] - Business logic components:
//!   - [`core::ledger`] - Per-user locks, cached reads, balance writes and history
//!   - [`core::processor`] - Transaction classification, ordered locking, worker pool
//!   - [`core::batch`] - Deposit batching per recipient
//!   - [`core::service`] - Caller-facing API
//! - [`store`] - In-memory implementations of the collaborator traits
//! - [`io`], [`cli`], [`replay`] - CSV replay driver
//!
//! # Transaction Types
//!
//! - **Deposit**: Credit funds to a user; may be queued and coalesced per recipient
//! - **Withdrawal**: Debit funds from a user (requires sufficient balance)
//! - **Transfer**: Move funds between two users under both locks, taken in
//!   ascending user-ID order
//! - **Adjustment**: Administrative correction; not applied by the processor
//!
//! # Invariants
//!
//! - A balance is never negative
//! - Every transaction ends `completed` or `failed`, never stuck `pending`
//! - A failed transfer leaves neither side changed

pub mod cli;
pub mod config;
pub mod core;
pub mod io;
pub mod replay;
pub mod store;
pub mod types;

pub use config::LedgerConfig;
pub use core::{
    AuditSink, BalanceLedger, BalanceStore, BatchConfig, Cache, LedgerService, MetricsRecorder,
    SubmitOutcome, TransactionProcessor, TransactionStore,
};
pub use io::write_balances_csv;
pub use types::{
    Amount, Balance, BalanceHistory, LedgerError, Transaction, TransactionId, TransactionStatus,
    TransactionType, UserId,
};
