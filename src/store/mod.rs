//! Store module
//!
//! In-memory implementations of the collaborator traits in
//! [`crate::core::traits`].

pub mod memory;

pub use memory::{MemoryAuditSink, MemoryBalanceStore, MemoryCache, MemoryTransactionStore};
