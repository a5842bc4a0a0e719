//! Core ledger module
//!
//! This module contains the ledger components:
//! - `traits` - Collaborator interfaces (balance/transaction stores, audit sink, cache)
//! - `ledger` - Per-user locking, cached balance reads and balance writes
//! - `processor` - Transaction classification, ordered locking and the worker pool
//! - `batch` - Deposit batching configuration and worker loop
//! - `service` - Caller-facing API
//! - `metrics` - Injected metrics recorder

pub mod batch;
pub mod ledger;
pub mod metrics;
pub mod processor;
pub mod service;
pub mod traits;

pub use batch::BatchConfig;
pub use ledger::{AccountGuard, BalanceLedger, LockSet};
pub use metrics::{InMemoryMetrics, MetricsRecorder, NoopMetrics};
pub use processor::{SubmitOutcome, TransactionProcessor};
pub use service::LedgerService;
pub use traits::{AuditSink, BalanceStore, Cache, TransactionStore};
