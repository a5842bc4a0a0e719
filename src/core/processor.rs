//! Transaction processor: classification, ordered locking and the worker pool
//!
//! # Architecture
//!
//! ```text
//! TransactionProcessor (Clone, Arc-shared)
//!     ├── Arc<BalanceLedger>            (locks + balance writes)
//!     ├── Arc<dyn TransactionStore>     (status persistence)
//!     ├── BatchConfig
//!     └── worker pool                   (started by `start`, drained by `stop`)
//!           └── mpsc queue of deposits  (bounded, try_send with inline fallback)
//! ```
//!
//! Withdrawals and transfers always run inline on the caller's task because
//! they need an up-to-date balance check. Deposits may be queued and coalesced
//! per recipient by a worker (see [`super::batch`]).

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::batch::{self, BatchConfig};
use super::ledger::BalanceLedger;
use super::metrics::MetricsRecorder;
use super::traits::TransactionStore;
use crate::types::{
    Amount, AuditAction, EntityType, ErrorKind, LedgerError, Movement, Transaction,
    TransactionId, TransactionStatus, TransactionType, UserId,
};

/// What `submit` did with a transaction
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Handed to the worker pool; the transaction is still `pending`
    Queued { id: TransactionId },

    /// Applied on the caller's task; the transaction is `completed`
    Processed(Transaction),
}

/// Applies transactions against the ledger
#[derive(Clone)]
pub struct TransactionProcessor {
    inner: Arc<Inner>,
}

struct Inner {
    ledger: Arc<BalanceLedger>,
    transactions: Arc<dyn TransactionStore>,
    config: BatchConfig,

    /// Present while the worker pool accepts deposits
    intake: Mutex<Option<mpsc::Sender<Transaction>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    shutdown: Mutex<Option<CancellationToken>>,
}

impl TransactionProcessor {
    pub fn new(
        ledger: Arc<BalanceLedger>,
        transactions: Arc<dyn TransactionStore>,
        config: BatchConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                ledger,
                transactions,
                config,
                intake: Mutex::new(None),
                workers: Mutex::new(Vec::new()),
                shutdown: Mutex::new(None),
            }),
        }
    }

    pub fn ledger(&self) -> &Arc<BalanceLedger> {
        &self.inner.ledger
    }

    pub fn config(&self) -> &BatchConfig {
        &self.inner.config
    }

    pub(crate) fn metrics(&self) -> &Arc<dyn MetricsRecorder> {
        self.inner.ledger.metrics()
    }

    /// Whether the worker pool is currently accepting deposits
    pub async fn is_running(&self) -> bool {
        self.inner.intake.lock().await.is_some()
    }

    /// Apply one pending transaction synchronously
    ///
    /// The transaction ends `completed` or `failed`, and that status is
    /// persisted either way. A transaction that is not `pending` is rejected
    /// untouched.
    #[instrument(skip(self, tx), fields(tx_id = tx.id, tx_type = %tx.tx_type))]
    pub async fn process_transaction(&self, tx: Transaction) -> Result<Transaction, LedgerError> {
        if tx.status != TransactionStatus::Pending {
            return Err(LedgerError::invalid_status_transition(
                tx.id,
                tx.status,
                TransactionStatus::Completed,
            ));
        }
        let started = Instant::now();
        let result = match tx.movement() {
            Ok(movement) => self.apply(movement).await,
            Err(e) => Err(e),
        };
        self.settle(tx, result, started).await
    }

    /// Offer a transaction for processing
    ///
    /// Deposits go to the worker queue when the pool is running and the queue
    /// has room; otherwise, and for every other type, the transaction is
    /// processed inline. The caller is never blocked on a full queue.
    pub async fn submit(&self, tx: Transaction) -> Result<SubmitOutcome, LedgerError> {
        if !tx.tx_type.is_batchable() || tx.validate().is_err() {
            return self
                .process_transaction(tx)
                .await
                .map(SubmitOutcome::Processed);
        }

        let sender = self.inner.intake.lock().await.clone();
        let Some(sender) = sender else {
            return self
                .process_transaction(tx)
                .await
                .map(SubmitOutcome::Processed);
        };

        let id = tx.id;
        match sender.try_send(tx) {
            Ok(()) => {
                debug!(tx_id = id, "deposit queued");
                Ok(SubmitOutcome::Queued { id })
            }
            Err(TrySendError::Full(tx)) => {
                warn!(tx_id = id, "deposit queue full, processing inline");
                self.metrics().record_operation("queue", "full");
                self.process_transaction(tx)
                    .await
                    .map(SubmitOutcome::Processed)
            }
            Err(TrySendError::Closed(tx)) => self
                .process_transaction(tx)
                .await
                .map(SubmitOutcome::Processed),
        }
    }

    /// Start the worker pool
    ///
    /// Cancelling `token` closes intake like [`stop`](Self::stop) but does not
    /// wait for the workers. Calling `start` on a running processor does
    /// nothing.
    pub async fn start(&self, token: CancellationToken) {
        let mut intake = self.inner.intake.lock().await;
        if intake.is_some() {
            debug!("processor already running");
            return;
        }

        let config = &self.inner.config;
        let (sender, receiver) = mpsc::channel(config.queue_capacity);
        let queue = Arc::new(Mutex::new(receiver));
        let shutdown = token.child_token();

        let mut workers = self.inner.workers.lock().await;
        for worker_id in 0..config.worker_count {
            workers.push(tokio::spawn(batch::run_worker(
                worker_id,
                Arc::clone(&queue),
                self.clone(),
            )));
        }

        let processor = self.clone();
        let watch = shutdown.clone();
        workers.push(tokio::spawn(async move {
            watch.cancelled().await;
            processor.close_intake().await;
        }));

        *self.inner.shutdown.lock().await = Some(shutdown);
        *intake = Some(sender);
        info!(
            workers = config.worker_count,
            queue_capacity = config.queue_capacity,
            max_batch_size = config.max_batch_size,
            "transaction processor started"
        );
    }

    /// Stop accepting deposits and wait for the workers to drain the queue
    pub async fn stop(&self) {
        self.close_intake().await;
        if let Some(token) = self.inner.shutdown.lock().await.take() {
            token.cancel();
        }

        let handles = std::mem::take(&mut *self.inner.workers.lock().await);
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "worker task panicked");
            }
        }
        info!("transaction processor stopped");
    }

    async fn close_intake(&self) {
        if self.inner.intake.lock().await.take().is_some() {
            debug!("deposit intake closed");
        }
    }

    async fn apply(&self, movement: Movement) -> Result<(), LedgerError> {
        match movement {
            Movement::Deposit { to, amount } => self.apply_deposit(to, amount).await,
            Movement::Withdrawal { from, amount } => self.apply_withdrawal(from, amount).await,
            Movement::Transfer { from, to, amount } => {
                self.apply_transfer(from, to, amount).await
            }
            Movement::Adjustment { user_id, amount } => {
                self.apply_adjustment(user_id, amount).await
            }
        }
    }

    /// Credit `amount` to a user under their lock
    ///
    /// Also used by the batch path with a group's summed amount.
    pub(crate) async fn apply_deposit(&self, to: UserId, amount: Amount) -> Result<(), LedgerError> {
        let ledger = self.ledger();
        let mut guard = ledger.lock_for(to).await;
        let mut balance = ledger.balance_locked(&mut guard).await?;
        balance.add(amount)?;
        ledger.update_locked(&mut guard, balance.amount()).await?;
        Ok(())
    }

    async fn apply_withdrawal(&self, from: UserId, amount: Amount) -> Result<(), LedgerError> {
        let ledger = self.ledger();
        let mut guard = ledger.lock_for(from).await;
        let mut balance = ledger.balance_locked(&mut guard).await?;
        balance.subtract(amount)?;
        ledger.update_locked(&mut guard, balance.amount()).await?;
        Ok(())
    }

    /// Move funds between two users under both locks
    ///
    /// Locks are taken in ascending user-ID order. The sender is written
    /// first; if the receiver write then fails, the sender is written back to
    /// its pre-transfer snapshot before the error is returned. The store offers
    /// no multi-row transaction, so this compensating write is the only thing
    /// keeping the pair consistent.
    async fn apply_transfer(
        &self,
        from: UserId,
        to: UserId,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        let ledger = self.ledger();
        let mut locks = ledger.lock_many(&[from, to]).await;
        debug!(order = ?locks.user_ids(), "transfer locks held");
        let (sender, receiver) = locks
            .pair_mut(from, to)
            .ok_or_else(|| LedgerError::same_account_transfer(from))?;

        let mut debited = ledger.balance_locked(sender).await?;
        let snapshot = debited.snapshot();
        debited.subtract(amount)?;
        let mut credited = ledger.balance_locked(receiver).await?;
        credited.add(amount)?;

        ledger.update_locked(sender, debited.amount()).await?;
        if let Err(cause) = ledger.update_locked(receiver, credited.amount()).await {
            warn!(from, to, error = %cause, "receiver write failed, rolling back sender");
            return match ledger.update_locked(sender, snapshot).await {
                Ok(_) => Err(cause),
                Err(rollback) => {
                    error!(user_id = from, error = %rollback, "sender rollback failed");
                    Err(LedgerError::rollback_failed(from, &cause, &rollback))
                }
            };
        }
        Ok(())
    }

    // Administrative corrections are applied through BalanceLedger::update_balance.
    async fn apply_adjustment(&self, user_id: UserId, _amount: Amount) -> Result<(), LedgerError> {
        debug!(user_id, "adjustment rejected by processor");
        Err(LedgerError::invalid_transaction_type(
            TransactionType::Adjustment.as_str(),
        ))
    }

    /// Move a transaction to its terminal status and record the outcome
    pub(crate) async fn settle(
        &self,
        mut tx: Transaction,
        result: Result<(), LedgerError>,
        started: Instant,
    ) -> Result<Transaction, LedgerError> {
        let operation = tx.tx_type.as_str();
        self.metrics()
            .observe_duration(operation, started.elapsed());

        match result {
            Ok(()) => {
                tx.complete()?;
                self.persist_status(&tx).await;
                self.audit_movement(&tx).await;
                info!(tx_id = tx.id, tx_type = operation, amount = %tx.amount, "transaction completed");
                self.metrics().record_operation(operation, "completed");
                Ok(tx)
            }
            Err(e) => {
                tx.fail(e.to_string())?;
                self.persist_status(&tx).await;
                match e.kind() {
                    ErrorKind::Infrastructure => {
                        error!(tx_id = tx.id, error = %e, "transaction failed")
                    }
                    ErrorKind::Declined => warn!(tx_id = tx.id, error = %e, "transaction declined"),
                    _ => warn!(tx_id = tx.id, error = %e, "transaction rejected"),
                }
                self.metrics().record_operation(operation, "failed");
                Err(e)
            }
        }
    }

    // Unsaved transactions (id 0) have nothing to update.
    async fn persist_status(&self, tx: &Transaction) {
        if tx.id == 0 {
            return;
        }
        if let Err(e) = self.inner.transactions.update(tx).await {
            error!(tx_id = tx.id, status = %tx.status, error = %e, "failed to persist transaction status");
        }
    }

    async fn audit_movement(&self, tx: &Transaction) {
        let details = match (tx.tx_type, tx.from_user_id, tx.to_user_id) {
            (TransactionType::Transfer, Some(from), Some(to)) => {
                format!("Processed transfer of {} from user {from} to user {to}", tx.amount)
            }
            (TransactionType::Withdrawal, Some(from), _) => {
                format!("Processed withdrawal of {} from user {from}", tx.amount)
            }
            (_, _, Some(to)) => format!("Processed {} of {} to user {to}", tx.tx_type, tx.amount),
            _ => format!("Processed {} of {}", tx.tx_type, tx.amount),
        };
        if let Err(e) = self
            .ledger()
            .audit()
            .log_action(
                EntityType::Transaction,
                tx.id,
                AuditAction::Update,
                &details,
                tx.actor(),
            )
            .await
        {
            error!(tx_id = tx.id, error = %e, "failed to write transaction audit entry");
        }
    }
}
