//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use ledger_link::core::metrics::InMemoryMetrics;
use ledger_link::core::traits::{BalanceStore, Cache};
use ledger_link::store::{MemoryAuditSink, MemoryBalanceStore, MemoryCache, MemoryTransactionStore};
use ledger_link::types::{Balance, BalanceHistory, StoreError, UserId};
use ledger_link::{Amount, BalanceLedger, LedgerConfig, LedgerService};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Balance store that rejects updates for selected users
///
/// Each armed user has a number of updates still allowed to succeed; once it
/// reaches zero every further update for that user fails.
#[derive(Default)]
pub struct FlakyBalanceStore {
    pub inner: MemoryBalanceStore,
    allowances: Mutex<HashMap<UserId, usize>>,
}

impl FlakyBalanceStore {
    pub fn fail_updates_for(&self, user_id: UserId) {
        self.fail_updates_after(user_id, 0);
    }

    pub fn fail_updates_after(&self, user_id: UserId, successes: usize) {
        self.allowances.lock().unwrap().insert(user_id, successes);
    }

    pub fn heal(&self, user_id: UserId) {
        self.allowances.lock().unwrap().remove(&user_id);
    }

    fn admit(&self, user_id: UserId) -> bool {
        match self.allowances.lock().unwrap().get_mut(&user_id) {
            None => true,
            Some(0) => false,
            Some(remaining) => {
                *remaining -= 1;
                true
            }
        }
    }
}

#[async_trait]
impl BalanceStore for FlakyBalanceStore {
    async fn get_by_user_id(&self, user_id: UserId) -> Result<Balance, StoreError> {
        self.inner.get_by_user_id(user_id).await
    }

    async fn create(&self, balance: &Balance) -> Result<(), StoreError> {
        self.inner.create(balance).await
    }

    async fn update(&self, balance: &Balance) -> Result<(), StoreError> {
        if !self.admit(balance.user_id) {
            return Err(StoreError::Backend(format!(
                "update rejected for user {}",
                balance.user_id
            )));
        }
        self.inner.update(balance).await
    }

    async fn get_history(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<BalanceHistory>, StoreError> {
        self.inner.get_history(user_id, limit).await
    }

    async fn create_history(&self, history: &BalanceHistory) -> Result<(), StoreError> {
        self.inner.create_history(history).await
    }
}

/// Cache whose every call fails
#[derive(Debug, Default)]
pub struct BrokenCache;

#[async_trait]
impl Cache for BrokenCache {
    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Err(StoreError::Backend("cache unavailable".to_string()))
    }

    async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), StoreError> {
        Err(StoreError::Backend("cache unavailable".to_string()))
    }

    async fn delete(&self, _key: &str) -> Result<(), StoreError> {
        Err(StoreError::Backend("cache unavailable".to_string()))
    }
}

/// A service wired to in-memory collaborators, with handles to inspect them
pub struct Harness {
    pub service: LedgerService,
    pub balances: Arc<FlakyBalanceStore>,
    pub transactions: Arc<MemoryTransactionStore>,
    pub audit: Arc<MemoryAuditSink>,
    pub metrics: Arc<InMemoryMetrics>,
}

impl Harness {
    pub fn new(config: LedgerConfig) -> Self {
        Self::with_cache(config, Arc::new(MemoryCache::new()))
    }

    pub fn with_cache(config: LedgerConfig, cache: Arc<dyn Cache>) -> Self {
        let balances = Arc::new(FlakyBalanceStore::default());
        let transactions = Arc::new(MemoryTransactionStore::new());
        let audit = Arc::new(MemoryAuditSink::new());
        let metrics = Arc::new(InMemoryMetrics::new());
        let ledger = BalanceLedger::new(balances.clone(), audit.clone(), metrics.clone(), config)
            .with_cache(cache);
        Self {
            service: LedgerService::new(Arc::new(ledger), transactions.clone()),
            balances,
            transactions,
            audit,
            metrics,
        }
    }

    pub async fn balance(&self, user_id: UserId) -> Amount {
        self.service.get_balance(user_id).await.unwrap().amount()
    }

    pub async fn fund(&self, user_id: UserId, amount: Amount) {
        self.service
            .ledger()
            .create_initial_balance(user_id, amount)
            .await
            .unwrap();
    }
}

pub fn cents(minor: i64) -> Amount {
    Amount::from_minor(minor)
}
