//! In-memory collaborator implementations
//!
//! These back the replay driver and the test-suite. Each store keeps its rows
//! in a `DashMap`, so concurrent workers touching different users never contend
//! on a single global lock.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use crate::core::traits::{AuditSink, BalanceStore, Cache, TransactionStore};
use crate::types::{
    AuditAction, AuditEntry, Balance, BalanceHistory, EntityType, StoreError, Transaction,
    TransactionId, UserId,
};

/// Balance rows and their history, keyed by user ID
#[derive(Debug, Default)]
pub struct MemoryBalanceStore {
    balances: DashMap<UserId, Balance>,

    /// Append order is chronological; reads reverse it
    history: DashMap<UserId, Vec<BalanceHistory>>,
}

impl MemoryBalanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored balances, sorted by user ID
    pub fn all_balances(&self) -> Vec<Balance> {
        let mut balances: Vec<Balance> = self
            .balances
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        balances.sort_by_key(|balance| balance.user_id);
        balances
    }

    /// Number of history rows written for a user
    pub fn history_len(&self, user_id: UserId) -> usize {
        self.history
            .get(&user_id)
            .map(|rows| rows.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl BalanceStore for MemoryBalanceStore {
    async fn get_by_user_id(&self, user_id: UserId) -> Result<Balance, StoreError> {
        self.balances
            .get(&user_id)
            .map(|balance| balance.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn create(&self, balance: &Balance) -> Result<(), StoreError> {
        match self.balances.entry(balance.user_id) {
            Entry::Occupied(_) => Err(StoreError::Conflict(format!(
                "balance for user {} already exists",
                balance.user_id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(balance.clone());
                Ok(())
            }
        }
    }

    async fn update(&self, balance: &Balance) -> Result<(), StoreError> {
        let mut stored = self
            .balances
            .get_mut(&balance.user_id)
            .ok_or(StoreError::NotFound)?;
        *stored = balance.clone();
        Ok(())
    }

    async fn get_history(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<BalanceHistory>, StoreError> {
        Ok(self
            .history
            .get(&user_id)
            .map(|rows| rows.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn create_history(&self, history: &BalanceHistory) -> Result<(), StoreError> {
        self.history
            .entry(history.user_id)
            .or_default()
            .push(history.clone());
        Ok(())
    }
}

/// Transaction rows with store-assigned, monotonically increasing IDs
#[derive(Debug)]
pub struct MemoryTransactionStore {
    next_id: AtomicU64,
    transactions: DashMap<TransactionId, Transaction>,
}

impl MemoryTransactionStore {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            transactions: DashMap::new(),
        }
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

impl Default for MemoryTransactionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransactionStore for MemoryTransactionStore {
    async fn create(&self, transaction: &Transaction) -> Result<TransactionId, StoreError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut stored = transaction.clone();
        stored.id = id;
        self.transactions.insert(id, stored);
        Ok(id)
    }

    async fn update(&self, transaction: &Transaction) -> Result<(), StoreError> {
        let mut stored = self
            .transactions
            .get_mut(&transaction.id)
            .ok_or(StoreError::NotFound)?;
        *stored = transaction.clone();
        Ok(())
    }

    async fn get_by_id(&self, id: TransactionId) -> Result<Transaction, StoreError> {
        self.transactions
            .get(&id)
            .map(|tx| tx.clone())
            .ok_or(StoreError::NotFound)
    }

    async fn get_by_user_id(&self, user_id: UserId) -> Result<Vec<Transaction>, StoreError> {
        let mut matching: Vec<Transaction> = self
            .transactions
            .iter()
            .filter(|entry| entry.value().involves(user_id))
            .map(|entry| entry.value().clone())
            .collect();
        matching.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        Ok(matching)
    }
}

/// Append-only audit log held in memory
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every entry in append order
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Entries about a single entity, in append order
    pub fn entries_for(&self, entity_type: EntityType, entity_id: u64) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .filter(|entry| entry.entity_type == entity_type && entry.entity_id == entity_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn log_action(
        &self,
        entity_type: EntityType,
        entity_id: u64,
        action: AuditAction,
        details: &str,
        actor_user_id: UserId,
    ) -> Result<(), StoreError> {
        let entry = AuditEntry::new(entity_type, entity_id, action, details, actor_user_id);
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(entry);
        Ok(())
    }
}

/// TTL cache; expired entries are dropped lazily on read
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, (String, Instant)>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .map(|entry| entry.1 > Instant::now())
            .unwrap_or(false)
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        let hit = match self.entries.get(key) {
            Some(entry) if entry.1 > now => Some(entry.0.clone()),
            Some(_) => None,
            None => return Ok(None),
        };
        if hit.is_none() {
            self.entries.remove_if(key, |_, (_, expires)| *expires <= now);
        }
        Ok(hit)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        self.entries
            .insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Amount;
    use chrono::Utc;

    fn balance(user_id: UserId, minor: i64) -> Balance {
        Balance::from_parts(user_id, Amount::from_minor(minor), Utc::now()).unwrap()
    }

    #[tokio::test]
    async fn test_balance_create_conflicts_on_duplicate() {
        let store = MemoryBalanceStore::new();
        store.create(&balance(1, 0)).await.unwrap();

        let result = store.create(&balance(1, 500)).await;

        assert!(matches!(result, Err(StoreError::Conflict(_))));
        assert_eq!(
            store.get_by_user_id(1).await.unwrap().amount(),
            Amount::ZERO
        );
    }

    #[tokio::test]
    async fn test_balance_update_requires_existing_row() {
        let store = MemoryBalanceStore::new();
        assert_eq!(
            store.update(&balance(2, 100)).await,
            Err(StoreError::NotFound)
        );
        assert_eq!(store.get_by_user_id(2).await, Err(StoreError::NotFound));
    }

    #[tokio::test]
    async fn test_history_is_newest_first_and_limited() {
        let store = MemoryBalanceStore::new();
        for step in 0..5 {
            let row = BalanceHistory::new(
                7,
                Amount::from_minor(step * 100),
                Amount::from_minor((step + 1) * 100),
            );
            store.create_history(&row).await.unwrap();
        }

        let rows = store.get_history(7, 3).await.unwrap();

        let new_amounts: Vec<i64> = rows.iter().map(|r| r.new_amount.minor_units()).collect();
        assert_eq!(new_amounts, vec![500, 400, 300]);
        assert_eq!(store.history_len(7), 5);
        assert!(store.get_history(8, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transaction_ids_are_assigned_in_order() {
        let store = MemoryTransactionStore::new();
        let first = store
            .create(&Transaction::deposit(1, Amount::from_minor(100), ""))
            .await
            .unwrap();
        let second = store
            .create(&Transaction::transfer(1, 2, Amount::from_minor(50), ""))
            .await
            .unwrap();

        assert_eq!((first, second), (1, 2));
        assert_eq!(store.get_by_id(2).await.unwrap().id, 2);
        assert_eq!(store.get_by_id(3).await, Err(StoreError::NotFound));
    }

    #[tokio::test]
    async fn test_user_transactions_cover_both_sides_newest_first() {
        let store = MemoryTransactionStore::new();
        store
            .create(&Transaction::deposit(1, Amount::from_minor(100), ""))
            .await
            .unwrap();
        store
            .create(&Transaction::deposit(3, Amount::from_minor(100), ""))
            .await
            .unwrap();
        store
            .create(&Transaction::transfer(2, 1, Amount::from_minor(50), ""))
            .await
            .unwrap();

        let ids: Vec<TransactionId> = store
            .get_by_user_id(1)
            .await
            .unwrap()
            .iter()
            .map(|tx| tx.id)
            .collect();

        assert_eq!(ids, vec![3, 1]);
    }

    #[tokio::test]
    async fn test_audit_entries_for_entity() {
        let sink = MemoryAuditSink::new();
        sink.log_action(EntityType::Balance, 1, AuditAction::Update, "a", 1)
            .await
            .unwrap();
        sink.log_action(EntityType::Transaction, 1, AuditAction::Update, "b", 1)
            .await
            .unwrap();
        sink.log_action(EntityType::Balance, 1, AuditAction::Update, "c", 2)
            .await
            .unwrap();

        let details: Vec<String> = sink
            .entries_for(EntityType::Balance, 1)
            .into_iter()
            .map(|entry| entry.details)
            .collect();

        assert_eq!(details, vec!["a", "c"]);
        let entries = sink.entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[2].actor_user_id, 2);
        assert_eq!(entries[2].action, AuditAction::Update);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_entries_expire() {
        let cache = MemoryCache::new();
        cache
            .set("balance:1", "{}".to_string(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get("balance:1").await.unwrap().as_deref(), Some("{}"));

        tokio::time::advance(Duration::from_secs(61)).await;

        assert_eq!(cache.get("balance:1").await.unwrap(), None);
        assert!(!cache.contains("balance:1"));
    }

    #[tokio::test]
    async fn test_cache_delete() {
        let cache = MemoryCache::new();
        cache
            .set("k", "v".to_string(), Duration::from_secs(60))
            .await
            .unwrap();
        cache.delete("k").await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);
    }
}
