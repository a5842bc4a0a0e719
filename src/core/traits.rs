//! Collaborator interfaces consumed by the ledger core
//!
//! The ledger never owns durable state itself. Balances, transactions, audit
//! entries and cached reads all live behind these traits so that the in-memory
//! implementations in [`crate::store`] can be swapped for real backends.
//!
//! Every method reports failures as [`StoreError`]; the ledger decides how a
//! given failure maps onto [`crate::types::LedgerError`].

use async_trait::async_trait;
use std::time::Duration;

use crate::types::{
    AuditAction, Balance, BalanceHistory, EntityType, StoreError, Transaction, TransactionId,
    UserId,
};

/// Durable persistence for balances and their history rows
#[async_trait]
pub trait BalanceStore: Send + Sync {
    /// Fetch the stored balance, or [`StoreError::NotFound`] if none exists
    async fn get_by_user_id(&self, user_id: UserId) -> Result<Balance, StoreError>;

    /// Persist a new balance; [`StoreError::Conflict`] if one already exists
    async fn create(&self, balance: &Balance) -> Result<(), StoreError>;

    async fn update(&self, balance: &Balance) -> Result<(), StoreError>;

    /// Most recent history rows first, at most `limit` of them
    async fn get_history(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<BalanceHistory>, StoreError>;

    async fn create_history(&self, history: &BalanceHistory) -> Result<(), StoreError>;
}

/// Durable persistence for transaction records
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Persist a new transaction and return the id assigned to it
    async fn create(&self, transaction: &Transaction) -> Result<TransactionId, StoreError>;

    async fn update(&self, transaction: &Transaction) -> Result<(), StoreError>;

    async fn get_by_id(&self, id: TransactionId) -> Result<Transaction, StoreError>;

    /// Transactions with the user on either side, newest first
    async fn get_by_user_id(&self, user_id: UserId) -> Result<Vec<Transaction>, StoreError>;
}

/// Append-only action log
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn log_action(
        &self,
        entity_type: EntityType,
        entity_id: u64,
        action: AuditAction,
        details: &str,
        actor_user_id: UserId,
    ) -> Result<(), StoreError>;
}

/// Best-effort key/value cache
///
/// Callers treat every error as a miss.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}
