//! Balance ledger: per-user locking, cached reads and history
//!
//! The ledger is the only component allowed to write balances. Every write
//! happens while holding the user's lock, which is a `tokio::sync::Mutex`
//! that owns the resident [`Balance`] for that user.
//!
//! # Architecture
//!
//! ```text
//! BalanceLedger
//!     ├── DashMap<UserId, Arc<Mutex<Option<Balance>>>>  (per-user locks, never removed)
//!     ├── Arc<dyn BalanceStore>                          (durable balances + history)
//!     ├── Arc<dyn AuditSink>                             (append-only action log)
//!     ├── Option<Arc<dyn Cache>>                         (best-effort read cache)
//!     └── Arc<dyn MetricsRecorder>
//! ```
//!
//! # Lock ordering
//!
//! Any path that needs more than one user's lock goes through
//! [`BalanceLedger::lock_many`], which acquires in ascending user-ID order and
//! releases in reverse. Taking a second lock by calling
//! [`BalanceLedger::lock_for`] while already holding one is not allowed.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, instrument, warn};

use super::metrics::MetricsRecorder;
use super::traits::{AuditSink, BalanceStore, Cache};
use crate::config::LedgerConfig;
use crate::types::{
    Amount, AuditAction, Balance, BalanceHistory, EntityType, LedgerError, StoreError, UserId,
};

type AccountSlot = Arc<Mutex<Option<Balance>>>;

/// Exclusive hold on one user's balance
///
/// The resident balance is loaded lazily on first use and stays in memory
/// for the lifetime of the ledger. Dropping the guard releases the lock.
#[derive(Debug)]
pub struct AccountGuard {
    user_id: UserId,
    slot: OwnedMutexGuard<Option<Balance>>,
}

impl AccountGuard {
    pub fn user_id(&self) -> UserId {
        self.user_id
    }
}

/// Several user locks acquired in ascending user-ID order
///
/// Guards are released in reverse acquisition order when the set is dropped.
#[derive(Debug)]
pub struct LockSet {
    guards: Vec<AccountGuard>,
}

impl LockSet {
    /// User IDs in acquisition order
    pub fn user_ids(&self) -> Vec<UserId> {
        self.guards.iter().map(AccountGuard::user_id).collect()
    }

    /// Borrow two distinct guards at once, in the order requested
    ///
    /// Returns `None` if either user is not part of the set or `a == b`.
    pub fn pair_mut(
        &mut self,
        a: UserId,
        b: UserId,
    ) -> Option<(&mut AccountGuard, &mut AccountGuard)> {
        let ia = self.guards.iter().position(|guard| guard.user_id == a)?;
        let ib = self.guards.iter().position(|guard| guard.user_id == b)?;
        if ia == ib {
            return None;
        }
        if ia < ib {
            let (left, right) = self.guards.split_at_mut(ib);
            Some((&mut left[ia], &mut right[0]))
        } else {
            let (left, right) = self.guards.split_at_mut(ia);
            Some((&mut right[0], &mut left[ib]))
        }
    }
}

impl Drop for LockSet {
    fn drop(&mut self) {
        while let Some(guard) = self.guards.pop() {
            debug!(user_id = guard.user_id, "releasing lock");
            drop(guard);
        }
    }
}

/// Fetches, caches and mutates balances under per-user locks
pub struct BalanceLedger {
    store: Arc<dyn BalanceStore>,
    audit: Arc<dyn AuditSink>,
    cache: Option<Arc<dyn Cache>>,
    metrics: Arc<dyn MetricsRecorder>,
    config: LedgerConfig,
    accounts: DashMap<UserId, AccountSlot>,
}

impl BalanceLedger {
    pub fn new(
        store: Arc<dyn BalanceStore>,
        audit: Arc<dyn AuditSink>,
        metrics: Arc<dyn MetricsRecorder>,
        config: LedgerConfig,
    ) -> Self {
        Self {
            store,
            audit,
            cache: None,
            metrics,
            config,
            accounts: DashMap::new(),
        }
    }

    /// Attach a read cache
    pub fn with_cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub(crate) fn audit(&self) -> &Arc<dyn AuditSink> {
        &self.audit
    }

    pub(crate) fn metrics(&self) -> &Arc<dyn MetricsRecorder> {
        &self.metrics
    }

    /// Acquire the lock for a single user, creating it on first use
    pub async fn lock_for(&self, user_id: UserId) -> AccountGuard {
        // the map ref must be released before awaiting the mutex
        let slot = Arc::clone(self.accounts.entry(user_id).or_default().value());
        debug!(user_id, "acquiring lock");
        AccountGuard {
            user_id,
            slot: slot.lock_owned().await,
        }
    }

    /// Acquire several users' locks in ascending user-ID order
    ///
    /// Duplicate IDs are collapsed, so `lock_many(&[5, 2, 5])` holds exactly
    /// the locks for users 2 and 5, taken in that order.
    pub async fn lock_many(&self, user_ids: &[UserId]) -> LockSet {
        let mut ordered = user_ids.to_vec();
        ordered.sort_unstable();
        ordered.dedup();

        let mut guards = Vec::with_capacity(ordered.len());
        for user_id in ordered {
            guards.push(self.lock_for(user_id).await);
        }
        LockSet { guards }
    }

    /// Current balance, read through the cache
    ///
    /// A miss is loaded and cached under the user's lock, the same lock every
    /// write invalidates under. A user with no stored balance gets a zero
    /// balance created for them, exactly once under concurrent first reads.
    #[instrument(skip(self))]
    pub async fn get_balance(&self, user_id: UserId) -> Result<Balance, LedgerError> {
        if let Some(balance) = self.cached(user_id).await {
            debug!(user_id, "balance cache hit");
            return Ok(balance);
        }

        // filled under the lock so a write cannot land between read and fill
        let mut guard = self.lock_for(user_id).await;
        let balance = self.balance_locked(&mut guard).await?;
        self.fill_cache(&balance).await;
        Ok(balance)
    }

    /// Register a user's balance with an opening amount
    ///
    /// Returns the existing balance untouched if the user already has one.
    #[instrument(skip(self, amount), fields(amount = %amount))]
    pub async fn create_initial_balance(
        &self,
        user_id: UserId,
        amount: Amount,
    ) -> Result<Balance, LedgerError> {
        if amount.is_negative() {
            return Err(LedgerError::negative_balance(user_id, amount));
        }
        let mut guard = self.lock_for(user_id).await;
        if let Some(existing) = &*guard.slot {
            return Ok(existing.clone());
        }
        let balance = self.fetch_or_create(user_id, amount).await?;
        *guard.slot = Some(balance.clone());
        Ok(balance)
    }

    /// Set a user's balance to an absolute amount
    #[instrument(skip(self, new_amount), fields(new_amount = %new_amount))]
    pub async fn update_balance(
        &self,
        user_id: UserId,
        new_amount: Amount,
    ) -> Result<BalanceHistory, LedgerError> {
        let mut guard = self.lock_for(user_id).await;
        self.update_locked(&mut guard, new_amount).await
    }

    /// Most recent history rows first
    ///
    /// `limit == 0` selects the configured default; larger limits are clamped.
    pub async fn get_balance_history(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<BalanceHistory>, LedgerError> {
        let limit = self.config.history_limit(limit);
        self.store
            .get_history(user_id, limit)
            .await
            .map_err(|source| {
                LedgerError::infrastructure(
                    format!("failed to load balance history for user {user_id}"),
                    source,
                )
            })
    }

    /// Reconstruct the balance as it stood at `at`
    ///
    /// Walks history newest-first, undoing each mutation made after `at`. The
    /// walk covers at most `max_history_limit` rows.
    pub async fn get_balance_at_time(
        &self,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> Result<Balance, LedgerError> {
        let current = self.get_balance(user_id).await?;
        let history = self
            .get_balance_history(user_id, self.config.max_history_limit)
            .await?;

        let mut amount = current.amount();
        let mut last_updated_at = current.last_updated_at;
        for row in history {
            if row.created_at <= at {
                break;
            }
            amount = row.old_amount;
            last_updated_at = row.created_at;
        }
        Balance::from_parts(user_id, amount, last_updated_at)
    }

    /// Resident balance of a locked user, loading or creating it if needed
    pub async fn balance_locked(&self, guard: &mut AccountGuard) -> Result<Balance, LedgerError> {
        Ok(self.ensure_loaded(guard).await?.clone())
    }

    /// Write a new absolute amount for a locked user
    ///
    /// On persistence failure the resident balance is put back to its previous
    /// value and the error is returned; the cache stays invalidated. History
    /// and audit writes happen after the balance is durable, so their failures
    /// are logged rather than returned.
    pub async fn update_locked(
        &self,
        guard: &mut AccountGuard,
        new_amount: Amount,
    ) -> Result<BalanceHistory, LedgerError> {
        let user_id = guard.user_id;
        if new_amount.is_negative() {
            return Err(LedgerError::negative_balance(user_id, new_amount));
        }
        let started = Instant::now();

        self.invalidate(user_id).await;

        let balance = self.ensure_loaded(guard).await?;
        let previous = balance.clone();
        balance.set_amount(new_amount)?;

        if let Err(source) = self.store.update(balance).await {
            *balance = previous;
            error!(user_id, error = %source, "balance write failed, resident balance restored");
            self.metrics.record_operation("balance_update", "error");
            return Err(LedgerError::infrastructure(
                format!("failed to update balance for user {user_id}"),
                source,
            ));
        }

        // a concurrent read may have re-cached the old row during the write
        self.invalidate(user_id).await;

        let history = BalanceHistory::new(user_id, previous.amount(), new_amount);
        if let Err(e) = self.store.create_history(&history).await {
            error!(user_id, error = %e, "failed to record balance history");
        }
        let details = format!(
            "Balance updated from {} to {}",
            previous.amount(),
            new_amount
        );
        if let Err(e) = self
            .audit
            .log_action(EntityType::Balance, user_id, AuditAction::Update, &details, user_id)
            .await
        {
            error!(user_id, error = %e, "failed to write balance audit entry");
        }

        info!(user_id, old = %previous.amount(), new = %new_amount, "balance updated");
        self.metrics.record_operation("balance_update", "ok");
        self.metrics
            .observe_duration("balance_update", started.elapsed());
        Ok(history)
    }

    async fn ensure_loaded<'g>(
        &self,
        guard: &'g mut AccountGuard,
    ) -> Result<&'g mut Balance, LedgerError> {
        let user_id = guard.user_id;
        if guard.slot.is_none() {
            let balance = self.fetch_or_create(user_id, Amount::ZERO).await?;
            *guard.slot = Some(balance);
        }
        Ok(guard.slot.get_or_insert_with(|| Balance::new(user_id)))
    }

    // Caller must hold the user's lock.
    async fn fetch_or_create(
        &self,
        user_id: UserId,
        initial: Amount,
    ) -> Result<Balance, LedgerError> {
        match self.store.get_by_user_id(user_id).await {
            Ok(balance) => return Ok(balance),
            Err(StoreError::NotFound) => {}
            Err(source) => {
                return Err(LedgerError::infrastructure(
                    format!("failed to load balance for user {user_id}"),
                    source,
                ))
            }
        }

        let balance = Balance::from_parts(user_id, initial, Utc::now())?;
        match self.store.create(&balance).await {
            Ok(()) => {}
            // another writer outside this process got there first
            Err(StoreError::Conflict(_)) => {
                return self.store.get_by_user_id(user_id).await.map_err(|source| {
                    LedgerError::infrastructure(
                        format!("failed to load balance for user {user_id}"),
                        source,
                    )
                });
            }
            Err(source) => {
                return Err(LedgerError::infrastructure(
                    format!("failed to create balance for user {user_id}"),
                    source,
                ))
            }
        }

        let details = format!("Initial balance created with amount {initial}");
        if let Err(e) = self
            .audit
            .log_action(EntityType::Balance, user_id, AuditAction::Create, &details, user_id)
            .await
        {
            error!(user_id, error = %e, "failed to write balance audit entry");
        }
        info!(user_id, amount = %initial, "balance created");
        self.metrics.record_operation("balance_create", "ok");
        Ok(balance)
    }

    async fn cached(&self, user_id: UserId) -> Option<Balance> {
        let cache = self.cache.as_ref()?;
        let raw = match cache.get(&cache_key(user_id)).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!(user_id, error = %e, "cache read failed, falling back to store");
                return None;
            }
        };
        match serde_json::from_str::<Balance>(&raw) {
            Ok(balance) if !balance.amount().is_negative() => Some(balance),
            Ok(_) => {
                warn!(user_id, "ignoring cached negative balance");
                None
            }
            Err(e) => {
                warn!(user_id, error = %e, "ignoring undecodable cache entry");
                None
            }
        }
    }

    async fn fill_cache(&self, balance: &Balance) {
        let Some(cache) = self.cache.as_ref() else {
            return;
        };
        let raw = match serde_json::to_string(balance) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(user_id = balance.user_id, error = %e, "failed to encode balance for cache");
                return;
            }
        };
        if let Err(e) = cache
            .set(&cache_key(balance.user_id), raw, self.config.cache_ttl)
            .await
        {
            warn!(user_id = balance.user_id, error = %e, "cache write failed");
        }
    }

    async fn invalidate(&self, user_id: UserId) {
        if let Some(cache) = self.cache.as_ref() {
            if let Err(e) = cache.delete(&cache_key(user_id)).await {
                warn!(user_id, error = %e, "cache invalidation failed");
            }
        }
    }
}

fn cache_key(user_id: UserId) -> String {
    format!("balance:{user_id}")
}
